use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    authoring::StoryAuthoring,
    chapter_view::ChapterViewController,
    config::MarketConfig,
    errors::{MarketError, MarketResult},
    purchase::PurchaseOrchestrator,
    record_store::RecordStore,
    record_store_sled::SledRecordStore,
    story::UserSession,
    wallet::{PaymentBridge, WalletConnection},
    wallet_rpc::JsonRpcBridge,
};

/// Everything a CLI command or HTTP handler needs, built once per process.
pub struct AppState {
    pub config: MarketConfig,
    pub store: Arc<dyn RecordStore>,
    pub authoring: StoryAuthoring,
    pub orchestrator: Arc<PurchaseOrchestrator>,
}

impl AppState {
    pub fn new(
        config: MarketConfig,
        store: Arc<dyn RecordStore>,
        bridge: Arc<dyn PaymentBridge>,
    ) -> Self {
        let wallet = WalletConnection::new(bridge, config.wallet.expected_chain_id);
        let orchestrator = Arc::new(PurchaseOrchestrator::new(
            Arc::clone(&store),
            Arc::new(RwLock::new(wallet)),
        ));

        Self {
            authoring: StoryAuthoring::new(Arc::clone(&store)),
            config,
            store,
            orchestrator,
        }
    }

    /// Opens the sled store under `data_dir` and a JSON-RPC bridge for the wallet.
    pub fn from_config(config: MarketConfig) -> MarketResult<Self> {
        let store: Arc<dyn RecordStore> = Arc::new(SledRecordStore::open(&config.data_dir)?);
        let bridge: Arc<dyn PaymentBridge> = Arc::new(JsonRpcBridge::from_config(&config.wallet)?);
        Ok(Self::new(config, store, bridge))
    }

    pub async fn connect_wallet(&self) -> MarketResult<()> {
        if !self.config.wallet_enabled() {
            return Err(MarketError::config("wallet.contract_address is not configured"));
        }
        self.orchestrator.wallet().write().await.connect().await
    }

    /// A fresh controller for one view of one story.
    pub fn chapter_view(
        &self,
        story_id: &str,
        session: Option<UserSession>,
    ) -> ChapterViewController {
        ChapterViewController::new(
            story_id,
            session,
            Arc::clone(&self.store),
            Arc::clone(&self.orchestrator),
        )
        .with_reconcile_on_load(self.config.reconcile_on_load)
    }
}
