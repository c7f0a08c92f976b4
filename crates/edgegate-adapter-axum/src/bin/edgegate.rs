use std::path::PathBuf;

use edgegate_adapter_axum::run_from_manifest;
use edgegate_core::manifest::MANIFEST_FILE;

fn main() -> anyhow::Result<()> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(MANIFEST_FILE));
    run_from_manifest(&path)
}
