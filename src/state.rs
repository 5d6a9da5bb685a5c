use std::sync::Arc;

use crate::auth::{CredentialVerifier, TokenSigner};
use crate::config::Config;
use crate::io::prepare_io;
use crate::ledger::ReceiptLedger;
use crate::notify::{self, Notifier};
use crate::receipt::ReceiptDesk;
use crate::roster::RosterStore;

/// Everything a handler may touch, shared behind an `Arc` extension.
pub struct AppState {
    pub credentials: CredentialVerifier,
    pub roster: RosterStore,
    pub receipts: ReceiptDesk,
    pub notifier: Box<dyn Notifier>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let notifier = notify::from_config(&config)?;
        Self::with_notifier(config, notifier).await
    }

    pub async fn with_notifier(
        config: Config,
        notifier: Box<dyn Notifier>,
    ) -> anyhow::Result<Arc<Self>> {
        prepare_io(&[config.data_dir.as_path(), config.receipts_dir().as_path()]).await?;

        let signer = TokenSigner::new(config.token_secret.clone(), config.token_ttl);
        let credentials = CredentialVerifier::new(&config.admin, signer)?;
        let roster = RosterStore::csv(config.roster_path(), config.required_fields.clone());
        let receipts = ReceiptDesk::new(
            config.receipts_dir(),
            ReceiptLedger::json(config.ledger_path()),
            config.branding.clone(),
        );

        log::info!("Data lives under {}", config.data_dir.display());
        Ok(Arc::new(Self {
            credentials,
            roster,
            receipts,
            notifier,
        }))
    }
}
