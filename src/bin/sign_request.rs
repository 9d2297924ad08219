//! Client-side helper that signs a request and prints the headers to send
//! Usage: cargo run --bin sign_request -- --secret S --method POST --path /upload-url [--body JSON] [--nonce N|auto] [--algorithm SHA-256] [--timestamp MS]

use presign_gateway::signing::{RequestSigner, SignInput, SigningAlgorithm, SigningConfig};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

struct Args {
    secret: SecretString,
    method: String,
    path: String,
    body: Option<String>,
    nonce: Option<String>,
    algorithm: SigningAlgorithm,
    timestamp: Option<i64>,
}

fn usage() {
    println!("Usage: sign_request --secret SECRET --method METHOD --path PATH [options]");
    println!("  --body BODY         Request body to sign (default: empty)");
    println!("  --nonce NONCE       Nonce to sign; 'auto' generates a UUID");
    println!("  --algorithm ALG     SHA-256, SHA-384 or SHA-512 (default: SHA-256)");
    println!("  --timestamp MS      Epoch milliseconds (default: now)");
}

fn fail(message: &str) -> ! {
    eprintln!("ERROR: {}", message);
    std::process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut secret = None;
    let mut method = None;
    let mut path = None;
    let mut body = None;
    let mut nonce = None;
    let mut algorithm = SigningAlgorithm::default();
    let mut timestamp = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--help" || flag == "-h" {
            usage();
            std::process::exit(0);
        }

        let value = match args.get(i + 1) {
            Some(value) => value.clone(),
            None => fail(&format!("{} requires a value", flag)),
        };
        match flag {
            "--secret" => secret = Some(SecretString::new(value)),
            "--method" => method = Some(value),
            "--path" => path = Some(value),
            "--body" => body = Some(value),
            "--nonce" => {
                nonce = Some(if value == "auto" {
                    Uuid::new_v4().to_string()
                } else {
                    value
                })
            }
            "--algorithm" => {
                algorithm = value.parse().unwrap_or_else(|e| fail(&format!("{}", e)));
            }
            "--timestamp" => {
                timestamp = Some(
                    value
                        .parse()
                        .unwrap_or_else(|_| fail("--timestamp must be epoch milliseconds")),
                );
            }
            _ => fail(&format!("Unknown argument: {}", flag)),
        }
        i += 2;
    }

    Args {
        secret: secret.unwrap_or_else(|| fail("--secret is required")),
        method: method.unwrap_or_else(|| fail("--method is required")),
        path: path.unwrap_or_else(|| fail("--path is required")),
        body,
        nonce,
        algorithm,
        timestamp,
    }
}

fn main() -> anyhow::Result<()> {
    let args = parse_args();

    let signer = RequestSigner::new(
        SigningConfig::new(args.secret.expose_secret().clone()).with_algorithm(args.algorithm),
    )?;

    let mut input = SignInput::new(&args.method, &args.path);
    input.body = args.body.as_deref();
    input.nonce = args.nonce.as_deref();
    input.timestamp = args.timestamp;

    let signed = signer.sign(input);
    for (name, value) in signed.headers.iter() {
        println!("{}: {}", name, value.to_str()?);
    }

    Ok(())
}
