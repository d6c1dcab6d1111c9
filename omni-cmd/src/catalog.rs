//! Listing report suites and their catalogs.

use log::info;
use omni_api::{Account, AccountConfig, CatalogKind, LookupKey};

/// Turn a `--suite` argument into a lookup key; plain numbers are positions.
pub fn suite_key(arg: &str) -> LookupKey {
    match arg.parse::<usize>() {
        Ok(position) => LookupKey::Position(position),
        Err(_) => LookupKey::Key(arg.to_string()),
    }
}

pub async fn list_suites(config: &AccountConfig) -> anyhow::Result<()> {
    let account = Account::from_config(config).await?;
    for suite in account.suites().iter() {
        println!("{}", suite);
    }
    Ok(())
}

pub async fn list_catalog(
    config: &AccountConfig,
    suite: &str,
    kind: CatalogKind,
) -> anyhow::Result<()> {
    let account = Account::from_config(config).await?;
    let suite = account.suite(suite_key(suite))?;
    let catalog = suite.catalog(kind).await?;
    info!("{} {} in {}", catalog.len(), kind.name(), suite.id());
    for entry in catalog.iter() {
        println!("{}", entry);
    }
    Ok(())
}
