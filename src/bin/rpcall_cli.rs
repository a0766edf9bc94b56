//! rpcall CLI: 按服务协议发起单次调用、查看协议内容的命令行工具
//!
//! Usage:
//!   rpcall-cli call <api> --proto <file> --server <url> [--params <json>] [--json] [--timeout <ms>] [--ws]
//!   rpcall-cli proto <file>                        List services in a protocol file
//!   rpcall-cli version

use rpcall::protocol::ServiceKind;
use rpcall::{CallOptions, CallOutcome, ClientBuilder, ClientConfig, ServiceProto};
use serde_json::Value;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("RPCALL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "call" => cmd_call(&args[2..]).await,
        "proto" => cmd_proto(&args[2..]).await,
        "version" | "--version" | "-V" => cmd_version(),
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"rpcall-cli: RPC 调用命令行工具

USAGE:
    rpcall-cli <COMMAND> [OPTIONS]

COMMANDS:
    call <api> [OPTIONS]        Call one API and print its return as JSON
        --proto <file>          Protocol file (.yaml, .yml or .json)
        --server <url>          Server URL (falls back to RPCALL_SERVER)
        --params <json>         Request params (default: {{}})
        --json                  Use JSON on the wire instead of MessagePack
        --timeout <ms>          Call timeout in milliseconds (0 = none)
        --ws                    Call over WebSocket instead of HTTP
    proto <file>                List services defined in a protocol file
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    RPCALL_SERVER               Default server URL
    RPCALL_TIMEOUT_MS           Default call timeout
    RPCALL_JSON                 Use JSON on the wire (1/true)
    RPCALL_DEBUG_BUF            Log every wire buffer at debug level (1/true)
    RPCALL_LOG                  Log filter, e.g. `rpcall=debug`"#
    );
}

fn cmd_version() {
    println!("rpcall-cli {}", env!("CARGO_PKG_VERSION"));
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

async fn load_proto(path: &str) -> ServiceProto {
    match ServiceProto::load_from_file(path).await {
        Ok(proto) => proto,
        Err(e) => fail(e),
    }
}

async fn cmd_call(args: &[String]) {
    let Some(api) = args.first().filter(|a| !a.starts_with("--")) else {
        fail("missing <api>");
    };
    let Some(proto_path) = flag_value(args, "--proto") else {
        fail("missing --proto <file>");
    };
    let proto = load_proto(proto_path).await;
    if let Err(e) = proto.require_api(api) {
        fail(e);
    }

    let params: Value = match flag_value(args, "--params") {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| fail(format!("invalid --params: {e}"))),
        None => Value::Object(Default::default()),
    };

    let mut config = ClientConfig::new(flag_value(args, "--server").unwrap_or_default()).with_env_overrides();
    if let Some(server) = flag_value(args, "--server") {
        config.server = server.to_string();
    }
    if config.server.is_empty() {
        fail("missing --server <url> (or RPCALL_SERVER)");
    }
    if has_flag(args, "--json") {
        config.json = true;
    }
    let mut options = CallOptions::new();
    if let Some(ms) = flag_value(args, "--timeout") {
        match ms.parse::<u64>() {
            Ok(ms) => options = options.timeout(Duration::from_millis(ms)),
            Err(_) => fail(format!("invalid --timeout: {ms}")),
        }
    }

    let builder = ClientBuilder::new(proto, config).logger(std::sync::Arc::new(rpcall::logger::TracingLogSink));
    let outcome = if has_flag(args, "--ws") {
        let client = builder.build_ws().unwrap_or_else(|e| fail(e));
        if let Err(e) = client.connect().await {
            fail(e);
        }
        let outcome = client.call_api::<_, Value>(api, &params, options).await;
        client.disconnect().await;
        outcome
    } else {
        let client = builder.build_http().unwrap_or_else(|e| fail(e));
        client.call_api::<_, Value>(api, &params, options).await
    };

    let (printed, ok) = match outcome {
        CallOutcome::Settled(ret) => {
            let ok = ret.is_succ();
            (serde_json::to_string_pretty(&ret), ok)
        }
        CallOutcome::Aborted => (Ok("\"aborted\"".to_string()), false),
    };
    match printed {
        Ok(s) => println!("{s}"),
        Err(e) => fail(e),
    }
    if !ok {
        std::process::exit(2);
    }
}

async fn cmd_proto(args: &[String]) {
    let Some(path) = args.first() else {
        fail("missing <file>");
    };
    let proto = load_proto(path).await;
    println!("version {}", proto.version);
    for service in &proto.services {
        println!(
            "{:>4}  {:<3}  {:<32}  /{}",
            service.id,
            service.kind.as_str(),
            service.name,
            service.path()
        );
    }
    let apis = proto
        .services
        .iter()
        .filter(|s| s.kind == ServiceKind::Api)
        .count();
    println!("{} api(s), {} msg(s)", apis, proto.services.len() - apis);
}
