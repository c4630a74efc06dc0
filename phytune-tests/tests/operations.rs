use std::io;

use phytune_client::{
    client::{Builder, Config, TuneClient},
    error::RpcError,
};
use phytune_protocol::{
    Lane, MC_CMD_KR_TUNE, Namespace, ParameterSetting, Request, error::DecodeError,
};
use phytune_tests::{ScriptedTransport, SimulatedController, words};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn setting(text: &str, namespace: Namespace) -> ParameterSetting {
    ParameterSetting::parse(text, namespace).unwrap()
}

#[test]
fn get_rxeq_decodes_all_entries() {
    let transport = ScriptedTransport::new([Ok(words(&[0x0005_0102, 0x0000_00ff, 0x1e0a_0900]))]);
    let client = Builder::new().build(&transport, "eth2");

    let entries = client.get_rxeq().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].unwrap().to_string(), "Lane1.DFE_Tap1=5");
    assert_eq!(entries[1], Err(DecodeError::UnknownParameter(255)));
    assert_eq!(entries[2].unwrap().to_string(), "Lane1.Attenuation=30 (initial=10)");

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].device, "eth2");
    assert_eq!(requests[0].command, MC_CMD_KR_TUNE);
    assert_eq!(requests[0].request, words(&[0]));
    assert_eq!(requests[0].max_response, 252);
}

#[test]
fn get_txeq_uses_transmit_namespace() {
    let transport = ScriptedTransport::new([Ok(words(&[0x0000_0009, 0x0000_000a]))]);
    let client = Builder::new().build(&transport, "eth2");

    let entries = client.get_txeq().unwrap();
    assert_eq!(entries[0].unwrap().parameter.name(), "Termination");
    assert_eq!(entries[1], Err(DecodeError::UnknownParameter(10)));
    assert_eq!(transport.decoded_requests(), vec![Request::GetTxEq]);
}

#[test]
fn set_selects_request_by_namespace() {
    let transport = ScriptedTransport::new([Ok(vec![]), Ok(vec![])]);
    let client = Builder::new().build(&transport, "eth2");

    let rx = setting("Lane2.DFE_Tap1=12+", Namespace::RxEq);
    let tx = setting("Lane4.Slew_Rate=0x10", Namespace::TxEq);
    client.set_parameter(&rx).unwrap();
    client.set_parameter(&tx).unwrap();

    assert_eq!(
        transport.decoded_requests(),
        vec![Request::SetRxEq(rx), Request::SetTxEq(tx)]
    );
    let requests = transport.requests();
    assert_eq!(requests[0].request, words(&[1, 0x000c_0a02]));
    assert_eq!(requests[1].max_response, 0);
}

#[test]
fn recalibrate_sends_single_word() {
    let transport = ScriptedTransport::new([Ok(vec![])]);
    let client = Builder::new().build(&transport, "eth2");
    client.recalibrate().unwrap();
    assert_eq!(transport.requests()[0].request, words(&[4]));
}

#[test]
fn capacity_guard_does_not_touch_transport() {
    // a set request is two words
    let transport = ScriptedTransport::new([]).with_max_payload(7);
    let client = Builder::new().build(&transport, "eth2");

    match client.set_parameter(&setting("Lane0.Attenuation=1", Namespace::RxEq)) {
        Err(RpcError::ResourceLimitExceeded { max, got }) => {
            assert_eq!(max, 7);
            assert_eq!(got, 8);
        }
        other => panic!("expected ResourceLimitExceeded, got {:?}", other),
    }
    assert!(transport.requests().is_empty());
}

#[test]
fn capacity_guard_covers_response_buffer() {
    let transport = ScriptedTransport::new([]).with_max_payload(64);
    let client = Builder::new().build(&transport, "eth2");

    match client.get_rxeq() {
        Err(RpcError::ResourceLimitExceeded { max: 64, got: 252 }) => {}
        other => panic!("expected ResourceLimitExceeded, got {:?}", other),
    }
    // requests without a response fit
    let transport = ScriptedTransport::new([Ok(vec![])]).with_max_payload(64);
    let client = Builder::new().build(&transport, "eth2");
    client.recalibrate().unwrap();
}

#[test]
fn configured_response_len_is_offered() {
    let transport = ScriptedTransport::new([Ok(vec![])]);
    let client = Builder::new().max_response_len(128).build(&transport, "eth2");
    client.get_rxeq().unwrap();
    assert_eq!(transport.requests()[0].max_response, 128);
}

#[test]
fn transport_errors_are_passed_through() {
    let transport = ScriptedTransport::new([
        Err(RpcError::ControllerRejected(5)),
        Err(RpcError::TransportUnavailable(io::Error::from(
            io::ErrorKind::NotFound,
        ))),
        Err(RpcError::TransportIoFailure(io::Error::other("ioctl failed"))),
    ]);
    let client = TuneClient::new(&transport, "eth2", Config::default());

    let err = client.recalibrate().unwrap_err();
    assert_eq!(err.controller_code(), Some(5));
    assert!(err.to_string().starts_with("Controller rejected request"));

    assert!(matches!(
        client.get_rxeq(),
        Err(RpcError::TransportUnavailable(_))
    ));
    let err = client.set_parameter(&setting("Lane0.Amplitude=1", Namespace::TxEq));
    assert!(matches!(err, Err(RpcError::TransportIoFailure(_))));
    assert_eq!(transport.remaining_replies(), 0);
}

#[test]
fn active_lane_is_lane_of_first_entry() {
    let transport = ScriptedTransport::new([
        Ok(words(&[0x0000_0300, 0x0000_0000])),
        Ok(vec![]),
    ]);
    let client = Builder::new().build(&transport, "eth2");

    assert_eq!(client.active_lane().unwrap(), Lane::new(3).unwrap());
    assert!(matches!(client.active_lane(), Err(RpcError::MissingLane)));
}

#[test]
fn simulated_set_then_get() {
    init_logging();
    let controller = SimulatedController::new(5);
    let client = Builder::new().build(&controller, "eth2");

    client
        .set_parameter(&setting("Lane3.CTLE_Boost=017", Namespace::RxEq))
        .unwrap();
    client
        .set_parameter(&setting("Lane1.Preemphasis=9+", Namespace::TxEq))
        .unwrap();

    let rx = client.get_rxeq().unwrap();
    assert_eq!(rx.len(), 5 * 8);
    let lines: Vec<String> = rx.iter().map(|e| e.unwrap().to_string()).collect();
    assert!(lines.contains(&"Lane3.CTLE_Boost=15".to_owned()));
    assert!(lines.contains(&"Lane0.DFE_Gain=0".to_owned()));

    client.recalibrate().unwrap();
    let tx = client.get_txeq().unwrap();
    assert_eq!(tx.len(), 5 * 10);
    let preemphasis = tx
        .iter()
        .map(|e| e.unwrap())
        .find(|p| p.lane.index() == 1 && p.parameter.name() == "Preemphasis")
        .unwrap();
    assert!(preemphasis.autocal);
    assert_eq!(preemphasis.initial_value, 9);
    assert_eq!(preemphasis.value, 12);
    assert_eq!(preemphasis.to_string(), "Lane1.Preemphasis=12 (initial=9)");
}

#[test]
fn simulated_controller_rejects_missing_lane() {
    let controller = SimulatedController::new(2);
    let client = Builder::new().build(&controller, "eth2");
    let err = client
        .set_parameter(&setting("Lane4.Attenuation=1", Namespace::RxEq))
        .unwrap_err();
    assert_eq!(err.controller_code(), Some(22));
}
