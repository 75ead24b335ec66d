use std::env;
use std::fs;
use std::path::Path;

const RUNNER_CFG_NAME: &str = "runner.toml";

fn main() {
    let source_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let out_dir = env::var("OUT_DIR").unwrap();

    let source_path = Path::new(&source_dir).join("config").join(RUNNER_CFG_NAME);

    // Navigate three levels up, same as every other binary in this workspace
    // that ships a default config next to its source.
    let out_path = Path::new(&out_dir)
        .parent()
        .and_then(|pth| pth.parent())
        .and_then(|pth| pth.parent())
        .expect("failed navigating to the target directory");

    fs::copy(&source_path, out_path.join(RUNNER_CFG_NAME))
        .unwrap_or_else(|err| panic!("failed to copy {}: {}", RUNNER_CFG_NAME, err));
}
