//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document of the exchange API. The target path is the
//! first argument (default `openapi.json`); `-` prints to stdout instead.

use api_lib::web::rest::ApiDoc;
use std::io::Write;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn write_document(document: &str, target: &str) -> std::io::Result<()> {
    if target == "-" {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(document.as_bytes())?;
        return stdout.write_all(b"\n");
    }
    std::fs::write(target, document)?;
    eprintln!("OpenAPI document written to {target}");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    let document = ApiDoc::openapi().to_pretty_json()?;
    write_document(&document, &target)?;
    Ok(())
}
