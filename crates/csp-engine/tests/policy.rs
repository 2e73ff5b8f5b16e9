use std::rc::Rc;

use csp_core::testing::{FixedScript, RecordingHost, RecordingTransport};
use csp_engine::{
    ContentSecurityPolicy, EngineConfig, HeaderType, ReportingStatus, SchemeRegistry, SourceLocation,
};
use serde_json::json;
use url::Url;

const SEND: ReportingStatus = ReportingStatus::SendReport;

struct Fixture {
    host: Rc<RecordingHost>,
    transport: Rc<RecordingTransport>,
    csp: ContentSecurityPolicy,
}

fn fixture(document: &str, headers: &[(&str, HeaderType)]) -> Fixture {
    fixture_with(document, EngineConfig::default(), headers)
}

fn fixture_with(document: &str, config: EngineConfig, headers: &[(&str, HeaderType)]) -> Fixture {
    let host = Rc::new(RecordingHost::new(document));
    let transport = Rc::new(RecordingTransport::default());
    let mut csp = ContentSecurityPolicy::new(host.clone())
        .with_transport(transport.clone())
        .with_config(config);
    for (header, header_type) in headers {
        csp.did_receive_header(header, *header_type);
    }
    host.clear();
    Fixture { host, transport, csp }
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[test]
fn test_end_to_end_script_policy() {
    let header = "default-src 'self'; script-src 'self' https://cdn.example.com; report-uri /csp-report";
    let f = fixture("https://example.com/page", &[(header, HeaderType::Enforce)]);

    assert!(f.csp.allow_script_from_source(&url("https://example.com/app.js"), SEND));
    assert!(f.csp.allow_script_from_source(&url("https://cdn.example.com/lib.js"), SEND));
    assert!(f.transport.reports().is_empty());

    assert!(!f.csp.allow_script_from_source(&url("https://evil.example/x.js"), SEND));

    let sent = f.transport.reports();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.as_str(), "https://example.com/csp-report");
    assert_eq!(
        f.transport.json_reports()[0],
        json!({
            "csp-report": {
                "document-uri": "https://example.com/page",
                "referrer": "",
                "violated-directive": "script-src 'self' https://cdn.example.com",
                "original-policy": header,
                "blocked-uri": "https://evil.example",
            }
        })
    );
    assert_eq!(
        f.host.console_messages(),
        vec!["Refused to load the script 'https://evil.example/x.js' because it violates the following Content Security Policy directive: \"script-src 'self' https://cdn.example.com\".".to_string()]
    );
}

#[test]
fn test_fetch_directives_fall_back_to_default_src() {
    let f = fixture("https://example.com/", &[("default-src 'self'", HeaderType::Enforce)]);

    assert!(!f.csp.allow_image_from_source(&url("https://evil.example/a.png"), SEND));
    assert!(!f.csp.allow_font_from_source(&url("https://evil.example/a.woff"), SEND));
    assert!(!f.csp.allow_connect_to_source(&url("wss://evil.example/socket"), SEND));
    assert!(f.csp.allow_media_from_source(&url("https://example.com/a.mp4"), SEND));

    let console = f.host.console_messages();
    assert_eq!(console.len(), 3);
    assert!(console[0].ends_with(
        "\"default-src 'self'\". Note that 'img-src' was not explicitly set, so 'default-src' is used as a fallback."
    ));
    assert!(console[2].starts_with("Refused to connect to 'wss://evil.example/socket'"));
}

#[test]
fn test_base_uri_never_falls_back() {
    let f = fixture("https://example.com/", &[("default-src 'self'", HeaderType::Enforce)]);
    assert!(f.csp.allow_base_uri(&url("https://evil.example/"), SEND));
    assert!(f.csp.allow_form_action(&url("https://evil.example/submit"), SEND));

    let f = fixture("https://example.com/", &[("default-src *; base-uri 'self'", HeaderType::Enforce)]);
    assert!(!f.csp.allow_base_uri(&url("https://evil.example/"), SEND));
    assert!(f.csp.allow_base_uri(&url("https://example.com/base/"), SEND));
    assert!(f.host.console_messages()[0]
        .starts_with("Refused to set the document's base URI to 'https://evil.example/'"));
}

#[test]
fn test_every_policy_must_allow() {
    let f = fixture(
        "https://example.com/",
        &[
            ("img-src https://a.test; report-uri /r1", HeaderType::Enforce),
            ("img-src https://b.test; report-uri /r2", HeaderType::Enforce),
        ],
    );

    assert!(!f.csp.allow_image_from_source(&url("https://a.test/x.png"), SEND));
    let sent = f.transport.reports();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.as_str(), "https://example.com/r2");

    assert!(!f.csp.allow_image_from_source(&url("https://c.test/x.png"), SEND));
    let endpoints: Vec<String> = f.transport.reports().iter().map(|(u, _)| u.to_string()).collect();
    assert_eq!(
        endpoints,
        vec!["https://example.com/r2", "https://example.com/r1", "https://example.com/r2"]
    );
}

#[test]
fn test_report_only_never_blocks() {
    let f = fixture(
        "https://example.com/",
        &[("script-src 'none'; report-uri /r", HeaderType::Report)],
    );

    assert!(f.csp.allow_script_from_source(&url("https://example.com/a.js"), SEND));
    assert!(f.csp.allow_inline_script(None, SEND));
    assert!(f.csp.allow_eval(None, SEND));

    let console = f.host.console_messages();
    assert_eq!(console.len(), 3);
    assert!(console.iter().all(|m| m.starts_with("[Report Only] ")));
    assert_eq!(f.transport.reports().len(), 3);
    assert!(f.host.blocked_scripts().is_empty());
    assert!(f.host.eval_disabled().is_empty());
}

#[test]
fn test_report_and_enforce_together() {
    let f = fixture(
        "https://example.com/",
        &[
            ("img-src *", HeaderType::Enforce),
            ("img-src 'self'; report-uri /r", HeaderType::Report),
        ],
    );
    assert!(f.csp.allow_image_from_source(&url("https://cdn.test/a.png"), SEND));
    assert_eq!(f.transport.reports().len(), 1);
}

#[test]
fn test_suppressed_report_is_silent() {
    let f = fixture("https://example.com/", &[("img-src 'none'; report-uri /r", HeaderType::Enforce)]);
    assert!(!f.csp.allow_image_from_source(&url("https://example.com/a.png"), ReportingStatus::SuppressReport));
    assert!(f.host.console_messages().is_empty());
    assert!(f.transport.reports().is_empty());
}

#[test]
fn test_source_matching_through_policy() {
    let f = fixture(
        "https://example.com/",
        &[("img-src *.cdn.test https://static.test:443/img/ http://ports.test:*", HeaderType::Enforce)],
    );
    let status = ReportingStatus::SuppressReport;

    assert!(f.csp.allow_image_from_source(&url("https://a.cdn.test/x.png"), status));
    assert!(!f.csp.allow_image_from_source(&url("https://cdn.test/x.png"), status));
    assert!(!f.csp.allow_image_from_source(&url("http://a.cdn.test/x.png"), status));

    assert!(f.csp.allow_image_from_source(&url("https://static.test/img/a/b.png"), status));
    assert!(!f.csp.allow_image_from_source(&url("https://static.test/css/a.png"), status));
    assert!(!f.csp.allow_image_from_source(&url("https://static.test:8443/img/a.png"), status));

    assert!(f.csp.allow_image_from_source(&url("http://ports.test:8080/a.png"), status));
}

#[test]
fn test_none_alone_versus_combined() {
    let f = fixture("https://example.com/", &[("img-src 'none'", HeaderType::Enforce)]);
    assert!(!f.csp.allow_image_from_source(&url("https://example.com/a.png"), ReportingStatus::SuppressReport));

    let f = fixture("https://example.com/", &[("img-src 'none' https://a.test", HeaderType::Enforce)]);
    assert!(f.csp.allow_image_from_source(&url("https://a.test/a.png"), ReportingStatus::SuppressReport));
}

#[test]
fn test_parse_diagnostics_reach_the_console() {
    let host = Rc::new(RecordingHost::new("https://example.com/"));
    let mut csp = ContentSecurityPolicy::new(host.clone());
    csp.did_receive_header("img-src 'none' https://a.test; img-src *", HeaderType::Enforce);

    let console = host.console_messages();
    assert_eq!(console.len(), 2);
    assert!(console[0].contains("contains the keyword 'none' alongside other source expressions"));
    assert_eq!(console[1], "Ignoring duplicate Content-Security-Policy directive 'img-src'.");
}

#[test]
fn test_inline_script_report_carries_source_location() {
    let f = fixture(
        "https://example.com/page",
        &[("script-src 'self'; report-uri https://collector.test/csp", HeaderType::Enforce)],
    );
    let location = SourceLocation {
        url: url("https://example.com/page#frag"),
        line: 12,
    };

    assert!(!f.csp.allow_inline_script(Some(&location), SEND));
    assert_eq!(f.host.blocked_scripts(), vec!["script-src 'self'".to_string()]);

    let report = &f.transport.json_reports()[0]["csp-report"];
    assert_eq!(report["blocked-uri"], "");
    assert_eq!(report["source-file"], "https://example.com/page");
    assert_eq!(report["line-number"], 12);
    assert_eq!(
        f.host.console_messages()[0],
        "Refused to execute inline script because it violates the following Content Security Policy directive: \"script-src 'self'\"."
    );
}

#[test]
fn test_inline_variants() {
    let f = fixture(
        "https://example.com/",
        &[("default-src 'self'; style-src 'unsafe-inline'", HeaderType::Enforce)],
    );
    assert!(!f.csp.allow_inline_event_handlers(None, SEND));
    assert!(!f.csp.allow_javascript_urls(None, SEND));
    assert!(f.csp.allow_inline_style(None, SEND));

    let console = f.host.console_messages();
    assert!(console[0].starts_with("Refused to execute inline event handler because"));
    assert!(console[1].starts_with("Refused to execute JavaScript URL because"));
    assert!(console[1].ends_with("Note that 'script-src' was not explicitly set, so 'default-src' is used as a fallback."));
}

#[test]
fn test_eval_is_disabled_and_reported() {
    let host = Rc::new(RecordingHost::new("https://example.com/"));
    let transport = Rc::new(RecordingTransport::default());
    let mut csp = ContentSecurityPolicy::new(host.clone()).with_transport(transport.clone());
    csp.did_receive_header("script-src 'self'; report-uri /r", HeaderType::Enforce);

    assert_eq!(host.eval_disabled().len(), 1);
    assert_eq!(csp.eval_disabled_error_message(), Some(host.eval_disabled()[0].as_str()));

    let script = FixedScript(Some(SourceLocation {
        url: url("https://cdn.test/app.js"),
        line: 3,
    }));
    assert!(!csp.allow_eval(Some(&script), SEND));

    let report = &transport.json_reports()[0]["csp-report"];
    assert_eq!(report["source-file"], "https://cdn.test");
    assert_eq!(report["line-number"], 3);
    assert_eq!(host.blocked_scripts(), vec!["script-src 'self'".to_string()]);
}

#[test]
fn test_plugin_types() {
    let f = fixture("https://example.com/", &[("plugin-types application/pdf", HeaderType::Enforce)]);
    let pdf = url("https://example.com/doc.pdf");

    assert!(f.csp.allow_plugin_type("application/pdf", "application/pdf", &pdf, None, SEND));
    assert!(!f.csp.allow_plugin_type("application/pdf", "", &pdf, None, SEND));
    assert!(!f.csp.allow_plugin_type("application/x-shockwave-flash", "application/x-shockwave-flash", &pdf, None, SEND));

    let console = f.host.console_messages();
    assert_eq!(
        console[0],
        "Refused to load 'https://example.com/doc.pdf' (MIME type '') because it violates the following Content Security Policy Directive: 'plugin-types application/pdf'. When enforcing the 'plugin-types' directive, the plugin's media type must be explicitly declared with a 'type' attribute on the containing element (e.g. '<object type=\"[TYPE GOES HERE]\" ...>')."
    );
    assert!(!console[1].contains("When enforcing"));
}

#[test]
fn test_plugin_types_has_no_fallback() {
    let f = fixture("https://example.com/", &[("default-src 'none'", HeaderType::Enforce)]);
    assert!(f.csp.allow_plugin_type("application/pdf", "", &url("https://example.com/a.pdf"), None, SEND));
}

#[test]
fn test_blank_frames_and_wrapped_urls() {
    let f = fixture("https://example.com/", &[("default-src 'self'", HeaderType::Enforce)]);
    assert!(f.csp.allow_child_frame_from_source(&url("about:blank"), SEND));
    assert!(f.csp.allow_object_from_source(&url("about:blank"), SEND));
    assert!(f.csp.allow_image_from_source(&url("blob:https://example.com/6f1c"), SEND));
    assert!(!f.csp.allow_image_from_source(&url("blob:https://evil.example/6f1c"), SEND));
}

struct ExtensionSchemes;

impl SchemeRegistry for ExtensionSchemes {
    fn should_bypass_csp(&self, scheme: &str) -> bool {
        scheme == "chrome-extension"
    }
}

#[test]
fn test_bypassing_scheme_skips_every_policy() {
    let host = Rc::new(RecordingHost::new("https://example.com/"));
    let mut csp = ContentSecurityPolicy::new(host.clone()).with_scheme_registry(Rc::new(ExtensionSchemes));
    csp.did_receive_header("default-src 'none'", HeaderType::Enforce);
    host.clear();

    assert!(csp.allow_script_from_source(&url("chrome-extension://abc/script.js"), SEND));
    assert!(!csp.allow_script_from_source(&url("https://example.com/script.js"), SEND));
    assert_eq!(host.console_messages().len(), 1);
}

#[test]
fn test_blocked_uri_stripping() {
    let f = fixture("https://example.com/", &[("img-src 'none'; report-uri /r", HeaderType::Enforce)]);
    f.csp.allow_image_from_source(&url("https://user:pw@example.com/a.png?q=1#frag"), SEND);
    f.csp.allow_image_from_source(&url("data:image/png;base64,AAAA"), SEND);
    f.csp.allow_image_from_source(&url("https://other.test:8443/a.png"), SEND);

    let blocked: Vec<String> = f
        .transport
        .json_reports()
        .iter()
        .map(|r| r["csp-report"]["blocked-uri"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(blocked, vec!["https://example.com/a.png?q=1", "data", "https://other.test:8443"]);
}

#[test]
fn test_experimental_features() {
    let config = EngineConfig {
        experimental_features: true,
        ..EngineConfig::default()
    };
    let f = fixture_with("http://example.com/", config, &[("img-src example.com; report-uri /r", HeaderType::Enforce)]);

    assert!(f.csp.allow_image_from_source(&url("https://example.com/a.png"), SEND));
    assert!(!f.csp.allow_image_from_source(&url("https://evil.example/a.png"), SEND));
    assert_eq!(f.transport.json_reports()[0]["csp-report"]["effective-directive"], "img-src");

    let f = fixture("http://example.com/", &[("img-src example.com", HeaderType::Enforce)]);
    assert!(!f.csp.allow_image_from_source(&url("https://example.com/a.png"), ReportingStatus::SuppressReport));
}

#[test]
fn test_long_urls_are_elided_in_console() {
    let f = fixture("https://example.com/", &[("img-src 'none'", HeaderType::Enforce)]);
    let long = format!("https://example.com/{}", "a".repeat(2000));
    f.csp.allow_image_from_source(&url(&long), SEND);

    let console = &f.host.console_messages()[0];
    assert!(console.contains("..."));
    assert!(!console.contains(&long));
}

#[test]
fn test_report_includes_referrer() {
    let host = Rc::new(RecordingHost::new("https://example.com/").with_referrer("https://search.test/"));
    let transport = Rc::new(RecordingTransport::default());
    let mut csp = ContentSecurityPolicy::new(host.clone()).with_transport(transport.clone());
    csp.did_receive_header("connect-src 'none'; report-uri /r", HeaderType::Enforce);

    csp.allow_connect_to_source(&url("https://api.test/"), SEND);
    assert_eq!(transport.json_reports()[0]["csp-report"]["referrer"], "https://search.test/");
}

#[test]
fn test_gather_report_uris_in_delivery_order() {
    let f = fixture(
        "https://example.com/",
        &[
            ("img-src *; report-uri /a /b", HeaderType::Enforce),
            ("img-src *; report-uri https://c.test/", HeaderType::Report),
        ],
    );
    let uris: Vec<String> = f.csp.gather_report_uris().iter().map(Url::to_string).collect();
    assert_eq!(uris, vec!["https://example.com/a", "https://example.com/b", "https://c.test/"]);
}
