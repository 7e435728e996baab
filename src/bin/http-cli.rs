//! Thin command-line front end for the client façade (spec §6 "CLI
//! surface", explicitly out of the engine's own scope). Contains no
//! protocol logic of its own: it builds a `Body` from the `-d`/`-j`/`-f`
//! flags, drives `Client::wait()` to completion, and renders the result.
//! Ctrl-C handling follows `chopin`'s own `ctrlc::set_handler` pattern
//! (`chopin/src/server.rs`), here exiting directly with 130 rather than
//! flipping a flag, since this CLI owns no long-running loop to check one.

use clap::Parser;
use std::io::{Read, Write};
use std::process::ExitCode;
use std::time::Duration;
use uhttp_engine::body::Body;
use uhttp_engine::client::Client;
use uhttp_engine::codec::Headers;
use uhttp_engine::request::Method;

/// Minimal HTTP/1.x client. TLS is an external collaborator the engine
/// doesn't ship a backend for, so only `http://` targets are supported
/// here; `-k` is accepted for surface completeness but has nothing to
/// relax against.
#[derive(Parser)]
#[command(name = "http-cli")]
struct Args {
    url: String,

    #[arg(short = 'X', long = "method", default_value = "GET")]
    method: String,

    /// Send raw text as the request body.
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Send JSON as the request body; prefix with `@` to read it from a
    /// file (`-j @payload.json`) instead of passing it inline.
    #[arg(short = 'j', long = "json")]
    json: Option<String>,

    /// Send a file's raw bytes as the request body.
    #[arg(short = 'f', long = "file")]
    file: Option<String>,

    /// Repeatable `Key: Value` request header.
    #[arg(short = 'H', long = "header")]
    header: Vec<String>,

    /// Write the response body here instead of stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Print status, headers, and timing to stderr.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Accepted for CLI-surface completeness; no TLS backend to relax.
    #[arg(short = 'k', long = "insecure")]
    insecure: bool,

    /// Per-request timeout in seconds.
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u64>,
}

fn main() -> ExitCode {
    ctrlc::set_handler(|| std::process::exit(130)).expect("error setting Ctrl-C handler");
    uhttp_engine::logging::init_logging();

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("http-cli: {message}");
            ExitCode::from(1u8)
        }
    }
}

fn run(args: Args) -> Result<ExitCode, String> {
    let method = Method::parse(&args.method.to_ascii_uppercase())
        .ok_or_else(|| format!("unrecognized method: {}", args.method))?;

    let mut headers = Headers::new();
    for raw in &args.header {
        let (key, value) = raw
            .split_once(':')
            .ok_or_else(|| format!("bad header (expected 'Key: Value'): {raw}"))?;
        headers.insert(key.trim(), value.trim());
    }

    let body = build_body(&args)?;

    if args.insecure && args.url.starts_with("https://") {
        eprintln!("http-cli: -k/--insecure has no effect; this build carries no TLS backend");
    }

    let mut client = Client::from_url(&args.url, None).map_err(|e| e.to_string())?;
    client
        .request(method, "", headers, body, Vec::new(), None)
        .map_err(|e| e.to_string())?;

    if args.verbose {
        eprintln!("> {} {}", args.method.to_ascii_uppercase(), args.url);
    }

    let timeout = args.timeout.map(Duration::from_secs);
    let response = client.wait(timeout).map_err(|e| e.to_string())?;

    if args.verbose {
        eprintln!("< {} {}", response.status(), response.status_message());
        for (key, value) in response.headers().iter() {
            eprintln!("< {key}: {value}");
        }
    }

    match &args.output {
        Some(path) => {
            let mut f = std::fs::File::create(path).map_err(|e| format!("{path}: {e}"))?;
            f.write_all(response.body()).map_err(|e| format!("{path}: {e}"))?;
        }
        None => {
            let _ = std::io::stdout().write_all(response.body());
        }
    }

    if (200..400).contains(&response.status()) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1u8))
    }
}

fn build_body(args: &Args) -> Result<Body, String> {
    let given = [args.json.is_some(), args.file.is_some(), args.data.is_some()]
        .iter()
        .filter(|&&b| b)
        .count();
    if given > 1 {
        return Err("only one of -d/-j/-f may be given".to_string());
    }

    if let Some(json) = &args.json {
        let raw = match json.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?,
            None => json.clone(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| format!("invalid JSON: {e}"))?;
        return Ok(Body::Json(value));
    }

    if let Some(path) = &args.file {
        let mut f = std::fs::File::open(path).map_err(|e| format!("{path}: {e}"))?;
        let mut bytes = Vec::new();
        f.read_to_end(&mut bytes).map_err(|e| format!("{path}: {e}"))?;
        return Ok(Body::Bytes(bytes));
    }

    if let Some(data) = &args.data {
        return Ok(Body::Text(data.clone()));
    }

    Ok(Body::Empty)
}
