use std::process::ExitCode;

use clinic_records::config::{Settings, APP_NAME, APP_VERSION};
use clinic_records::crypto::{generate_salt, FieldKey};

const USAGE: &str = "usage: clinic-records [serve | keygen [--salt] | --version]";

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None | Some("serve") => {
            clinic_records::init_tracing();
            let result = match Settings::from_env() {
                Ok(settings) => clinic_records::run(settings).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                tracing::error!("{e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Some("keygen") => {
            if args.iter().any(|a| a == "--salt") {
                use base64::Engine;
                let salt = generate_salt();
                println!("{}", base64::engine::general_purpose::STANDARD.encode(salt));
            } else {
                println!("{}", FieldKey::generate().to_base64().as_str());
            }
            ExitCode::SUCCESS
        }
        Some("--version") => {
            println!("{APP_NAME} {APP_VERSION}");
            ExitCode::SUCCESS
        }
        Some(_) => {
            eprintln!("{USAGE}");
            ExitCode::from(2)
        }
    }
}
