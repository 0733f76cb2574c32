//! Account pipeline: nonce sequencing, gas ceiling, retry classification.

mod common;

use std::path::Path;
use std::sync::Arc;

use chain_eth::address::{parse_address, signing_key_from_hex};
use chain_eth::gas::{GAS_LIMIT_STRICT, GAS_LIMIT_TRANSFER, GWEI};
use chain_eth::retry::NodeErrorPayload;
use chain_eth::transaction::LegacyTransaction;
use coin_api::nonce::{NoncePolicy, NonceStore};
use coin_api::rpc::RpcError;
use coin_api::{
    Account, Amount, ApiType, CoinApi, CoinBackends, CoinTag, ErrorKind, NodeConfig, Registry,
    RegistryOptions, SettlementStatus, SpendRequest, Transfer,
};
use common::*;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

const ONE_ETH: u128 = 1_000_000_000_000_000_000;
const TEST_TX: &str = "0xpinned";

struct Fixture {
    registry: Registry,
    node: Arc<ScriptedTransport>,
    dir: tempfile::TempDir,
}

fn node(pending_nonce: u64) -> Arc<ScriptedTransport> {
    let node = ScriptedTransport::new();
    node.reply("eth_getTransactionCount", json!(format!("{pending_nonce:#x}")));
    node.reply("eth_gasPrice", json!("0x3b9aca00"));
    node.reply("eth_sendRawTransaction", json!("0xaccepted"));
    node
}

fn write_nonce(dir: &Path, nonce: u64) {
    NonceStore::for_coin(dir, CoinTag::Eth).store(nonce).unwrap();
}

fn read_nonce(dir: &Path) -> u64 {
    NonceStore::for_coin(dir, CoinTag::Eth).load().unwrap()
}

impl Fixture {
    fn new(node_nonce: u64, cached: Option<u64>) -> Self {
        Self::build(node_nonce, cached, NoncePolicy::PreferCached, false, ETH_KEY_ONE)
    }

    fn build(
        node_nonce: u64,
        cached: Option<u64>,
        policy: NoncePolicy,
        test_mode: bool,
        key: &str,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        if let Some(cached) = cached {
            write_nonce(dir.path(), cached);
        }
        let node = node(node_nonce);
        let registry = Registry::new(RegistryOptions {
            nonce_dir: dir.path().to_path_buf(),
            nonce_policy: policy,
            ..RegistryOptions::default()
        });
        let mut config = NodeConfig::new("http://127.0.0.1:8545");
        config.test_transaction = Some(TEST_TX.into());
        registry
            .initialize_with(
                "ETH",
                &config,
                Account::new(ETH_SERVICE_ADDRESS, key),
                test_mode,
                CoinBackends {
                    transport: node.clone(),
                    signer: None,
                },
            )
            .unwrap();
        Self {
            registry,
            node,
            dir,
        }
    }

    fn api(&self) -> Box<dyn CoinApi> {
        self.registry.api("ETH", "req-1").unwrap()
    }

    fn broadcasts(&self) -> Vec<String> {
        self.node
            .calls_to("eth_sendRawTransaction")
            .iter()
            .map(|p| p[0].as_str().unwrap().to_string())
            .collect()
    }
}

/// Raw transaction the pipeline is expected to broadcast.
fn expected_raw(nonce: u64, to: &str, value: u128, gas_price: u128, gas_limit: u64) -> String {
    let key = signing_key_from_hex(&SecretString::from(ETH_KEY_ONE)).unwrap();
    LegacyTransaction::transfer(1, nonce, parse_address(to).unwrap(), value, gas_price, gas_limit)
        .sign(&key)
        .unwrap()
        .raw_hex()
}

#[test]
fn cached_nonce_wins_over_node_and_warns() {
    let logs = LogBuffer::default();
    let fx = logs.capture(|| Fixture::new(5, Some(7)));

    assert_eq!(fx.registry.next_nonce(CoinTag::Eth), Some(7));
    assert!(logs.contents().contains("nonce desync"));
}

#[test]
fn node_policy_takes_node_nonce() {
    let fx = Fixture::build(5, Some(7), NoncePolicy::PreferNode, false, ETH_KEY_ONE);
    assert_eq!(fx.registry.next_nonce(CoinTag::Eth), Some(5));
}

#[test]
fn missing_nonce_file_uses_node_value() {
    let logs = LogBuffer::default();
    let fx = logs.capture(|| Fixture::new(5, None));

    assert_eq!(fx.registry.next_nonce(CoinTag::Eth), Some(5));
    assert!(logs.contents().contains("nonce file unusable"));
}

#[test]
fn send_uses_reserved_nonce_and_persists_next() {
    let fx = Fixture::new(5, Some(7));

    let receipt = fx.api().send(Amount::from_base_units(ONE_ETH), ETH_DESTINATION).unwrap();

    assert_eq!(receipt.tx_hash, "0xaccepted");
    assert_eq!(receipt.fee, Amount::from_base_units(GWEI));
    assert_eq!(
        fx.broadcasts(),
        [expected_raw(7, ETH_DESTINATION, ONE_ETH, GWEI, GAS_LIMIT_TRANSFER)]
    );
    assert_eq!(read_nonce(fx.dir.path()), 8);
}

#[test]
fn n_sends_advance_nonce_by_n() {
    let fx = Fixture::new(3, None);
    let api = fx.api();

    for _ in 0..4 {
        api.send(Amount::from_base_units(1_000), ETH_DESTINATION).unwrap();
    }

    let expected: Vec<String> = (3..7)
        .map(|n| expected_raw(n, ETH_DESTINATION, 1_000, GWEI, GAS_LIMIT_TRANSFER))
        .collect();
    assert_eq!(fx.broadcasts(), expected);
    assert_eq!(read_nonce(fx.dir.path()), 7);
    assert_eq!(fx.registry.next_nonce(CoinTag::Eth), Some(7));
}

#[test]
fn concurrent_sends_never_reuse_a_nonce() {
    let fx = Arc::new(Fixture::new(0, None));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let fx = fx.clone();
            std::thread::spawn(move || {
                let api = fx.registry.api("ETH", &format!("worker-{i}")).unwrap();
                for _ in 0..5 {
                    api.send(Amount::from_base_units(1), ETH_DESTINATION).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut raws = fx.broadcasts();
    assert_eq!(raws.len(), 20);
    raws.sort();
    raws.dedup();
    assert_eq!(raws.len(), 20);
    assert_eq!(read_nonce(fx.dir.path()), 20);
}

#[test]
fn quoted_gas_above_ceiling_is_capped() {
    let fx = Fixture::new(0, None);
    fx.node.reply("eth_gasPrice", json!("0x4a817c800")); // 20 gwei

    let logs = LogBuffer::default();
    let receipt = logs
        .capture(|| fx.api().send(Amount::from_base_units(ONE_ETH), ETH_DESTINATION))
        .unwrap();

    assert_eq!(receipt.fee, Amount::from_base_units(GWEI));
    assert_eq!(
        fx.broadcasts(),
        [expected_raw(0, ETH_DESTINATION, ONE_ETH, GWEI, GAS_LIMIT_TRANSFER)]
    );
    assert!(logs.contents().contains("gas price capped"));
}

#[test]
fn quoted_gas_below_ceiling_is_used() {
    let fx = Fixture::new(0, None);
    fx.node.reply("eth_gasPrice", json!("0x5f5e100")); // 0.1 gwei

    let logs = LogBuffer::default();
    let receipt = logs
        .capture(|| fx.api().send(Amount::from_base_units(ONE_ETH), ETH_DESTINATION))
        .unwrap();

    assert_eq!(receipt.fee, Amount::from_base_units(GWEI / 10));
    assert_eq!(
        fx.broadcasts(),
        [expected_raw(0, ETH_DESTINATION, ONE_ETH, GWEI / 10, GAS_LIMIT_TRANSFER)]
    );
    assert!(!logs.contents().contains("gas price capped"));
}

#[test]
fn insufficient_funds_rejection_is_retryable() {
    let fx = Fixture::new(3, None);
    fx.node.fail(
        "eth_sendRawTransaction",
        RpcError::Node(NodeErrorPayload {
            code: -32000,
            message: "insufficient funds for gas * price + value".into(),
        }),
    );

    let err = fx.api().send(Amount::from_base_units(ONE_ETH), ETH_DESTINATION).unwrap_err();

    assert!(err.retryable);
    assert!(matches!(err.kind, ErrorKind::Transport(_)));
    assert_eq!(fx.registry.next_nonce(CoinTag::Eth), Some(3));
    assert!(!NonceStore::for_coin(fx.dir.path(), CoinTag::Eth).path().exists());
}

#[test]
fn other_rejections_are_terminal() {
    let fx = Fixture::new(3, None);
    fx.node.fail(
        "eth_sendRawTransaction",
        RpcError::Node(NodeErrorPayload {
            code: -32000,
            message: "nonce too low".into(),
        }),
    );
    let err = fx.api().send(Amount::from_base_units(1), ETH_DESTINATION).unwrap_err();
    assert!(!err.retryable);

    fx.node.fail("eth_sendRawTransaction", RpcError::Transport("connection refused".into()));
    let err = fx.api().send(Amount::from_base_units(1), ETH_DESTINATION).unwrap_err();
    assert!(!err.retryable);
}

#[test]
fn test_mode_skips_broadcast_and_keeps_nonce() {
    let fx = Fixture::build(4, None, NoncePolicy::PreferCached, true, ETH_KEY_ONE);

    for _ in 0..3 {
        let receipt = fx.api().send(Amount::from_base_units(1), ETH_DESTINATION).unwrap();
        assert_eq!(receipt.tx_hash, TEST_TX);
    }

    assert!(fx.broadcasts().is_empty());
    assert!(fx.node.called("eth_gasPrice"));
    assert_eq!(fx.registry.next_nonce(CoinTag::Eth), Some(4));
    assert!(!NonceStore::for_coin(fx.dir.path(), CoinTag::Eth).path().exists());
}

#[test]
fn send_validates_input() {
    let fx = Fixture::new(0, None);
    let api = fx.api();

    let err = api.send(Amount::ZERO, ETH_DESTINATION).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Validation(_)));

    let err = api.send(Amount::from_base_units(1), "0x1234").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Validation(_)));
    assert!(fx.broadcasts().is_empty());
}

#[test]
fn missing_service_key_is_configuration_error() {
    let fx = Fixture::build(0, None, NoncePolicy::PreferCached, false, "");
    let err = fx.api().send(Amount::from_base_units(1), ETH_DESTINATION).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Configuration(_)));
}

fn spend_request(nonce: u64) -> SpendRequest {
    SpendRequest {
        address_from: ETH_SERVICE_ADDRESS.into(),
        address_to: ETH_DESTINATION.into(),
        inputs: Vec::new(),
        private_key: SecretString::from(ETH_KEY_ONE),
        nonce,
    }
}

#[test]
fn spend_sweeps_balance_with_caller_nonce() {
    let fx = Fixture::new(3, None);
    fx.node.reply("eth_getBalance", json!("0xde0b6b3a7640000"));

    let receipt = fx.api().spend(&spend_request(42)).unwrap();

    let fee = GWEI * u128::from(GAS_LIMIT_STRICT);
    assert_eq!(receipt.amount, Amount::from_base_units(ONE_ETH));
    assert_eq!(receipt.fee, Amount::from_base_units(GWEI));
    assert_eq!(
        fx.broadcasts(),
        [expected_raw(42, ETH_DESTINATION, ONE_ETH - fee, GWEI, GAS_LIMIT_STRICT)]
    );
    assert_eq!(
        fx.node.calls_to("eth_getBalance")[0],
        json!([ETH_SERVICE_ADDRESS, "latest"])
    );
    // The service sequence is untouched.
    assert_eq!(fx.registry.next_nonce(CoinTag::Eth), Some(3));
}

#[test]
fn spend_of_empty_account_is_validation_error() {
    let fx = Fixture::new(0, None);
    fx.node.reply("eth_getBalance", json!("0x0"));
    let err = fx.api().spend(&spend_request(0)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Validation(_)));
}

#[test]
fn spend_not_covering_fee_is_funds_error() {
    let fx = Fixture::new(0, None);
    fx.node.reply("eth_getBalance", json!("0x3e8"));
    let err = fx.api().spend(&spend_request(0)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Funds(_)));
    assert!(!err.retryable);
}

#[test]
fn send_many_accepts_a_single_destination() {
    let fx = Fixture::new(0, None);
    let mut batch = vec![
        Transfer::new("t1", ETH_DESTINATION, Amount::from_base_units(5)),
        Transfer::new("t2", ETH_DESTINATION, Amount::from_base_units(6)),
    ];

    let logs = LogBuffer::default();
    let receipt = logs.capture(|| fx.api().send_many(&mut batch)).unwrap();

    assert_eq!(batch[0].fee_charged, Amount::from_base_units(GWEI));
    assert_eq!(batch[1].fee_charged, Amount::ZERO);
    assert_eq!(receipt.fee, Amount::from_base_units(GWEI));
    assert_eq!(
        fx.broadcasts(),
        [expected_raw(0, ETH_DESTINATION, 11, GWEI, GAS_LIMIT_TRANSFER)]
    );
    assert!(logs.contents().contains("t1"));
}

#[test]
fn send_many_rejects_multiple_destinations() {
    let fx = Fixture::new(0, None);
    let mut batch = vec![
        Transfer::new("t1", ETH_DESTINATION, Amount::from_base_units(5)),
        Transfer::new("t2", ETH_SERVICE_ADDRESS, Amount::from_base_units(5)),
    ];
    let err = fx.api().send_many(&mut batch).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Validation(_)));
    assert!(fx.broadcasts().is_empty());

    let err = fx.api().send_many(&mut []).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Validation(_)));
}

#[test]
fn check_without_receipt_is_pending() {
    let fx = Fixture::new(0, None);
    fx.node.reply("eth_getTransactionReceipt", json!(null));

    let settlement = fx.api().check("0xabc", Amount::from_base_units(GWEI)).unwrap();

    assert_eq!(settlement.status, SettlementStatus::Pending);
    assert_eq!(settlement.fee, Amount::from_base_units(GWEI));
}

#[test]
fn check_recomputes_fee_from_gas_used() {
    let fx = Fixture::new(0, None);
    fx.node.reply(
        "eth_getTransactionReceipt",
        json!({"blockHash": "0x01", "blockNumber": "0x10", "gasUsed": "0x5208", "status": "0x1"}),
    );

    let settlement = fx.api().check("0xabc", Amount::from_base_units(GWEI)).unwrap();

    assert_eq!(settlement.status, SettlementStatus::Settled);
    assert_eq!(settlement.fee, Amount::from_base_units(GWEI * 21_000));
    assert_eq!(settlement.fee.to_decimal_string(18), "0.000021");
}

#[test]
fn check_reports_reverted_transaction() {
    let fx = Fixture::new(0, None);
    fx.node.reply(
        "eth_getTransactionReceipt",
        json!({"blockNumber": "0x10", "gasUsed": "0x5208", "status": "0x0"}),
    );
    let settlement = fx.api().check("0xabc", Amount::from_base_units(GWEI)).unwrap();
    assert_eq!(settlement.status, SettlementStatus::Failed);
}

#[test]
fn check_with_unmined_receipt_is_pending() {
    let fx = Fixture::new(0, None);
    fx.node.reply("eth_getTransactionReceipt", json!({"blockNumber": null}));
    let settlement = fx.api().check("0xabc", Amount::from_base_units(7)).unwrap();
    assert_eq!(settlement.status, SettlementStatus::Pending);
    assert_eq!(settlement.fee, Amount::from_base_units(7));
}

#[test]
fn balance_is_in_wei() {
    let fx = Fixture::new(0, None);
    fx.node.reply("eth_getBalance", json!("0xde0b6b3a7640000"));
    let balance = fx.api().balance(ETH_SERVICE_ADDRESS).unwrap();
    assert_eq!(balance.to_decimal_string(18), "1");
}

#[test]
fn address_validation_is_local() {
    let fx = Fixture::new(0, None);
    let api = fx.api();
    assert!(api.is_valid_address(ETH_DESTINATION).unwrap());
    assert!(!api.is_valid_address("0x123").unwrap());
    assert!(!fx.node.called("validateaddress"));
}

#[test]
fn create_account_imports_and_generates() {
    let fx = Fixture::new(0, None);
    let api = fx.api();

    let imported = api
        .create_account(Some(&SecretString::from(ETH_KEY_ONE)))
        .unwrap();
    assert_eq!(imported.address, ETH_SERVICE_ADDRESS);
    assert_eq!(imported.private_key.expose_secret(), ETH_KEY_ONE);

    let generated = api.create_account(None).unwrap();
    assert_eq!(generated.address.len(), 42);
    assert_eq!(generated.private_key.expose_secret().len(), 64);
}

#[test]
fn set_service_account_resyncs_nonce() {
    let fx = Fixture::new(5, Some(7));
    fx.node.reply("eth_getTransactionCount", json!("0x2"));

    fx.api()
        .set_service_account(Account::new(ETH_DESTINATION, ETH_KEY_ONE))
        .unwrap();

    assert_eq!(fx.registry.next_nonce(CoinTag::Eth), Some(2));
    assert_eq!(fx.api().service_address(), ETH_DESTINATION);
    assert_eq!(
        fx.node.calls_to("eth_getTransactionCount").last().unwrap(),
        &json!([ETH_DESTINATION, "pending"])
    );
}

#[test]
fn failed_resync_keeps_previous_account() {
    let fx = Fixture::new(5, None);
    fx.node.fail("eth_getTransactionCount", RpcError::Transport("down".into()));

    let err = fx
        .api()
        .set_service_account(Account::new(ETH_DESTINATION, ETH_KEY_ONE))
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::Transport(_)));
    assert_eq!(fx.api().service_address(), ETH_SERVICE_ADDRESS);
    assert_eq!(fx.registry.next_nonce(CoinTag::Eth), Some(5));
}

#[test]
fn redeem_script_is_not_supported() {
    let fx = Fixture::new(0, None);
    let api = fx.api();
    let err = api.redeem_script(&SecretString::from(ETH_KEY_ONE)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::OperationNotSupported);
    assert_eq!(api.api_type(), ApiType::EthereumApi);
}
