//! `tierd config` – show where the config lives and what is in effect.

use anyhow::Result;
use tierd_core::config::{self, TierdConfig};

pub fn run_config(cfg: &TierdConfig) -> Result<()> {
    let mut shown = cfg.clone();
    if shown.http.token.is_some() {
        shown.http.token = Some("<redacted>".to_string());
    }
    println!("# {}", config::config_path()?.display());
    print!("{}", shown.to_toml()?);
    Ok(())
}
