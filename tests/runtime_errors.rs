use armature::{
    Config, Node, abi,
    common::{
        Hex, Word,
        address::{Address, addr},
    },
    config::{GenesisAccount, dev_account},
    rpc::{self, Request, Response},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

/// PUSH1 0x2a PUSH1 0 SSTORE STOP
const SET_42: &str = "602a60005500";
/// PUSH1 0 PUSH1 0 REVERT
const REVERT: &str = "60006000fd";
/// PUSH1 1 PUSH1 2 INVALID
const INVALID: &str = "60016002fe";
/// PUSH1 42 PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
const ANSWER: &str = "602a60005260206000f3";

const SETTER: Address = addr("0x5e7");
const REVERTS: Address = addr("0xdead");
const FAULTS: Address = addr("0xfe");
const REASON: Address = addr("0x4ea5");
const ANSWERS: Address = addr("0x42");

/// CODECOPY the `Error("Message")` payload that follows the code, then REVERT it.
fn revert_with_message() -> String {
    let payload = abi::encode_revert_reason("Message");
    format!("6064600c60003960646000fd{}", hex::encode(payload))
}

fn node(strict: bool) -> Node {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let contract = |address, code: &str| GenesisAccount {
        address,
        balance: Word::zero(),
        code: Some(Hex::parse(code).unwrap()),
    };
    Node::new(
        Config::default()
            .strict(strict)
            .time(1_600_000_000)
            .account(contract(SETTER, SET_42))
            .account(contract(REVERTS, REVERT))
            .account(contract(FAULTS, INVALID))
            .account(contract(REASON, &revert_with_message()))
            .account(contract(ANSWERS, ANSWER)),
    )
}

fn tx(to: Address) -> Value {
    json!({ "from": dev_account(0), "to": to })
}

async fn send(node: &Node, to: Address) -> Response {
    rpc::dispatch(node, Request::new(1, "eth_sendTransaction", vec![tx(to)])).await
}

async fn call(node: &Node, to: Address) -> Response {
    rpc::dispatch(node, Request::new(2, "eth_call", vec![tx(to), json!("latest")])).await
}

fn hash_of(response: &Response) -> String {
    response.result.as_ref().unwrap().as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_send_success_returns_hash_either_way() {
    for strict in [false, true] {
        let node = node(strict);
        let response = send(&node, SETTER).await;
        assert_eq!(response.error, None);
        let hash = hash_of(&response);
        assert_eq!(hash.len(), 66);
        assert!(hash.starts_with("0x"));
    }
}

#[tokio::test]
async fn test_send_revert_lenient_is_silent() {
    let node = node(false);
    let response = send(&node, REVERTS).await;
    assert_eq!(response.error, None);
    assert_eq!(hash_of(&response).len(), 66);

    // The failure is still visible on the receipt.
    let receipt = rpc::dispatch(
        &node,
        Request::new(3, "eth_getTransactionReceipt", vec![json!(hash_of(&response))]),
    )
    .await;
    let receipt = receipt.result.unwrap();
    assert_eq!(receipt["status"], "0x0");
    assert_eq!(receipt["error"]["program_counter"], 4);
}

#[tokio::test]
async fn test_send_revert_strict_reports_program_counter() {
    let node = node(true);
    let response = send(&node, REVERTS).await;
    let hash = hash_of(&response);
    assert_eq!(hash.len(), 66);

    let error = response.error.unwrap();
    assert!(error.message.contains("revert"));
    let data = error.data.unwrap();
    assert_eq!(data[&hash]["error"], "revert");
    assert_eq!(data[&hash]["program_counter"], 4);
}

#[tokio::test]
async fn test_send_revert_strict_carries_reason() {
    let node = node(true);
    let response = send(&node, REASON).await;
    let hash = hash_of(&response);
    let error = response.error.unwrap();
    assert_eq!(
        error.message,
        "VM Exception while processing transaction: revert Message"
    );
    let detail = &error.data.unwrap()[&hash];
    assert_eq!(detail["reason"], "Message");
    assert_eq!(detail["program_counter"], 11);
}

#[tokio::test]
async fn test_send_fault_strict() {
    let node = node(true);
    let response = send(&node, FAULTS).await;
    let hash = hash_of(&response);
    let error = response.error.unwrap();
    assert_eq!(
        error.message,
        "VM Exception while processing transaction: invalid opcode"
    );
    assert_eq!(error.data.unwrap()[&hash]["program_counter"], 4);

    // A fault burns the whole gas limit.
    let receipt = node.receipt(Word::from_hex(&hash).unwrap()).await.unwrap();
    assert_eq!(receipt.gas_used, 90_000);
}

#[tokio::test]
async fn test_create_out_of_gas_on_deposit() {
    // PUSH2 400 PUSH1 0 RETURN: 400 bytes of runtime code cost 80000 to deposit,
    // more than the default gas limit leaves after the intrinsic charge.
    let create = json!({ "from": dev_account(0), "data": "0x6101906000f3" });
    for strict in [false, true] {
        let node = node(strict);
        let response = rpc::dispatch(
            &node,
            Request::new(4, "eth_sendTransaction", vec![create.clone()]),
        )
        .await;
        let hash = hash_of(&response);
        assert_eq!(hash.len(), 66);

        match response.error {
            Some(error) if strict => {
                assert_eq!(
                    error.message,
                    "VM Exception while processing transaction: out of gas"
                );
                let detail = &error.data.unwrap()[&hash];
                assert_eq!(detail["error"], "out of gas");
                assert_eq!(detail["program_counter"], 5);
            }
            None if !strict => {}
            other => panic!("strict={strict}: unexpected error {other:?}"),
        }

        let receipt = node.receipt(Word::from_hex(&hash).unwrap()).await.unwrap();
        assert_eq!(receipt.gas_used, 90_000);
        assert_eq!(receipt.contract_address, None);
        assert_eq!(node.nonce(dev_account(0)).await, 1);
    }
}

#[tokio::test]
async fn test_failed_send_does_not_commit() {
    let node = node(false);
    send(&node, REVERTS).await;
    send(&node, FAULTS).await;
    assert_eq!(node.nonce(dev_account(0)).await, 2);
    assert_eq!(node.block_number().await, 2);
    assert_eq!(node.storage_at(SETTER, Word::zero()).await, Word::zero());

    send(&node, SETTER).await;
    assert_eq!(node.storage_at(SETTER, Word::zero()).await, Word::from(0x2au8));
}

#[tokio::test]
async fn test_call_revert_without_reason() {
    let response = call(&node(false), REVERTS).await;
    assert_eq!(response.error, None);
    assert_eq!(response.result, Some(json!("0x")));

    let response = call(&node(true), REVERTS).await;
    assert_eq!(response.result, None);
    assert!(response.error.unwrap().message.contains("revert"));
}

#[tokio::test]
async fn test_call_revert_with_reason() {
    let response = call(&node(false), REASON).await;
    let expected = format!("0x{}", hex::encode(abi::encode_revert_reason("Message")));
    assert_eq!(response.result, Some(json!(expected)));

    let response = call(&node(true), REASON).await;
    assert_eq!(response.result, None);
    let message = response.error.unwrap().message;
    assert!(message.contains("revert"));
    assert!(message.contains("Message"));
}

#[tokio::test]
async fn test_call_success_and_no_mutation() {
    let node = node(true);
    let response = call(&node, ANSWERS).await;
    assert_eq!(
        response.result,
        Some(json!(format!("0x{}", Word::from(42u8).to_hex())))
    );

    call(&node, SETTER).await;
    assert_eq!(node.storage_at(SETTER, Word::zero()).await, Word::zero());
    assert_eq!(node.nonce(dev_account(0)).await, 0);
}

#[tokio::test]
async fn test_boundary_errors() {
    let node = node(false);
    let response = rpc::dispatch(&node, Request::new(9, "eth_mine", vec![])).await;
    assert_eq!(response.error.unwrap().code, rpc::METHOD_NOT_FOUND);

    let response = rpc::dispatch(&node, Request::new(9, "eth_getBalance", vec![json!(1)])).await;
    assert_eq!(response.error.unwrap().code, rpc::INVALID_PARAMS);

    let poor = json!({ "from": addr("0x9002"), "to": SETTER });
    let response = rpc::dispatch(&node, Request::new(9, "eth_sendTransaction", vec![poor])).await;
    assert_eq!(response.result, None);
    assert!(response.error.unwrap().message.contains("insufficient funds"));

    let unknown = format!("0x{}", Word::from(7u8).to_hex());
    let response =
        rpc::dispatch(&node, Request::new(9, "debug_traceTransaction", vec![json!(unknown)])).await;
    assert!(response.error.unwrap().message.contains("unknown transaction"));
}
