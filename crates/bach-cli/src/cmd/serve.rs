use bach_core::config::BachConfig;
use bach_core::PluginRegistry;
use bach_server::state::AppState;
use std::sync::Arc;

pub fn run(config: &BachConfig, port: u16) -> anyhow::Result<()> {
    let registry = Arc::new(PluginRegistry::from_config(config)?);
    let store = Arc::new(super::task::open_store(config)?);
    let state = AppState::new(registry, store);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(bach_server::serve(state, port))
}
