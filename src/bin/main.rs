use armature::{
    Config, Node,
    common::{Hex, address::addr, tx::TxRequest},
    config::GenesisAccount,
    decoder::{Bytecode, Decoder},
    policy,
};

fn dump(decoded: &Bytecode) {
    println!("{:<6} {:<15} Argument", "PC", "OpCode");
    println!("{}", "─".repeat(40));
    for instruction in &decoded.instructions {
        let argument = instruction
            .argument
            .as_ref()
            .map(|arg| format!("0x{}", hex::encode(arg)))
            .unwrap_or_default();
        println!(
            "{:#06x} {:<15} {argument}",
            instruction.offset,
            instruction.opcode.name()
        );
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let trace = args.iter().any(|arg| arg == "--trace");
    let positional: Vec<&String> = args[1..].iter().filter(|arg| *arg != "--trace").collect();
    if positional.is_empty() || positional.len() > 2 {
        eprintln!("Usage: {} <bytecode> [<calldata>] [--trace]", args[0]);
        std::process::exit(1);
    }

    let code = Hex::parse(positional[0])?;
    let calldata = match positional.get(1) {
        Some(data) => Hex::parse(data)?,
        None => Hex::default(),
    };
    dump(&Decoder::decode(code.as_bytes()));

    let target = addr("0x00000000000000000000000000000000000c0de5");
    let config = Config::load()?.account(GenesisAccount {
        address: target,
        balance: Default::default(),
        code: Some(code),
    });
    let from = config
        .accounts
        .first()
        .map(|account| account.address)
        .ok_or_else(|| eyre::eyre!("no genesis accounts configured"))?;
    let node = Node::new(config);

    let request = TxRequest::new(from).to(target).data(calldata);
    let response = node.send_transaction(request).await?;
    println!("\nTX: {}", response.hash_hex());

    if let Some(receipt) = node.receipt(response.hash).await {
        println!("STATUS: {}", receipt.status);
        println!("GAS USED: {}", receipt.gas_used);
    }
    if let Some(error) = &response.error {
        println!("ERROR: {}", error.message);
    }

    let traced = node.trace_transaction(response.hash).await?;
    match policy::message(&traced.outcome) {
        Some(message) => println!("FAILED: {message}"),
        None => println!("OK: 0x{}", traced.return_value),
    }
    if trace {
        println!("{}", serde_json::to_string_pretty(&traced)?);
    }
    Ok(())
}
