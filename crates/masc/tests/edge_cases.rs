//! Edge case tests for the masc facade
//!
//! Wiring of config, host and transport; logging setup; static-scope events.

use std::cell::RefCell;
use std::rc::Rc;

use masc::net::{TransportRequest, TransportResponse};
use masc::*;

/// Serves every URL with the URL itself as the body
struct EchoTransport {
    seen: Rc<RefCell<Vec<String>>>,
}

impl Transport for EchoTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, NetError> {
        self.seen.borrow_mut().push(request.url.clone());
        Ok(TransportResponse {
            status: Some(200),
            body: request.url,
            ..Default::default()
        })
    }
}

// ============================================================================
// WIRING
// ============================================================================

#[test]
fn test_loader_uses_config_document_url() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let config = Config::from_json(r#"{"document_url": "https://site.test/app/page.html"}"#).unwrap();
    let host = Rc::new(NullHost::new(config.document_url.clone()));
    let masc = Masc::with_transport(config, EchoTransport { seen: Rc::clone(&seen) }, host).unwrap();

    smol::block_on(masc.loader().load_script(LoadRequest::new("js/a.js"))).unwrap();

    assert_eq!(*seen.borrow(), vec!["https://site.test/app/js/a.js".to_string()]);
    assert_eq!(
        masc.loader().state_of(ResourceKind::Script, "js/a.js"),
        LoadState::Loaded
    );
}

#[test]
fn test_config_flags_reach_loader() {
    let config = Config::from_json(r#"{"coordinate_loads": false, "prefetch_assets": false}"#).unwrap();
    let host = Rc::new(NullHost::new(config.document_url.clone()));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let masc = Masc::with_transport(config, EchoTransport { seen }, host).unwrap();

    assert!(!masc.loader().config().coordinate_loads);
    assert!(!masc.loader().config().prefetch_assets);
}

#[test]
fn test_empty_user_agent_rejected() {
    let config = Config {
        user_agent: "  ".into(),
        ..Default::default()
    };
    assert!(matches!(Masc::headless(config), Err(MascError::Config(_))));
}

#[test]
fn test_fetch_json_through_facade() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let host = Rc::new(NullHost::new("http://localhost/"));
    let masc = Masc::with_transport(Config::default(), EchoTransport { seen }, host).unwrap();

    // the echoed URL is not JSON
    let err = smol::block_on(masc.fetcher().fetch_json("http://localhost/x")).unwrap_err();
    let err: MascError = err.into();

    assert!(matches!(err, MascError::Net(NetError::Content(_))));
}

// ============================================================================
// LOGGING
// ============================================================================

#[test]
fn test_logging_installs_once() {
    assert!(init_logging("debug").is_ok());
    assert!(matches!(init_logging("debug"), Err(MascError::Logging(_))));
}

// ============================================================================
// STATIC-SCOPE EVENTS
// ============================================================================

#[test]
fn test_global_events_are_shared_per_payload_type() {
    let names = Rc::new(RefCell::new(Vec::new()));
    let recorder = {
        let names = Rc::clone(&names);
        events::global_listener(move |name: &str, value: &u32| {
            names.borrow_mut().push(format!("{name}={value}"))
        })
    };

    GlobalEvents::<u32>::shared().add_event_listener("tick", recorder, false);
    GlobalEvents::<u32>::shared().fire_event("tick", &7);
    GlobalEvents::<String>::shared().fire_event("tick", &"ignored".to_string());

    assert_eq!(*names.borrow(), vec!["tick=7".to_string()]);
}
