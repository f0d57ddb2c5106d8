// Shared doubles and fixtures for the crate-internal test suites.

use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, RwLock};

use crate::authoring::StoryAuthoring;
use crate::chapter_view::ChapterViewController;
use crate::errors::{MarketError, MarketResult};
use crate::purchase::PurchaseOrchestrator;
use crate::record_store::RecordStore;
use crate::record_store_sled::SledRecordStore;
use crate::story::{
    Category, Chapter, ChapterDraft, NewChapter, NewStory, PurchaseRecord, Story, StoryDraft,
    UserSession,
};
use crate::wallet::{BridgeError, Network, PaymentBridge, Receipt, WalletConnection};

/// Scriptable in-process payment bridge.
pub struct MockBridge {
    accounts: Vec<String>,
    next_failure: Mutex<Option<BridgeError>>,
    next_query_failure: Mutex<Option<BridgeError>>,
    gate: Option<Arc<Notify>>,
    submissions: Mutex<Vec<(u64, u64, u128)>>,
    ledger: Mutex<HashSet<(String, u64, u64)>>,
    tx_counter: AtomicU64,
}

impl MockBridge {
    pub const ACCOUNT: &'static str = "0x00000000000000000000000000000000000000aa";
    pub const CHAIN_ID: u64 = 31337;

    pub fn new() -> Self {
        Self {
            accounts: vec![Self::ACCOUNT.to_string()],
            next_failure: Mutex::new(None),
            next_query_failure: Mutex::new(None),
            gate: None,
            submissions: Mutex::new(Vec::new()),
            ledger: Mutex::new(HashSet::new()),
            tx_counter: AtomicU64::new(0),
        }
    }

    pub fn without_accounts(mut self) -> Self {
        self.accounts.clear();
        self
    }

    /// Payments wait for `gate.notify_one()` before they are mined.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn fail_next(&self, err: BridgeError) {
        *self.next_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_next_query(&self, err: BridgeError) {
        *self.next_query_failure.lock().unwrap() = Some(err);
    }

    /// Pretends `account` paid on-chain without going through `submit_payment`.
    pub fn mark_paid_on_ledger(&self, account: &str, story_id: u64, chapter_id: u64) {
        self.ledger
            .lock()
            .unwrap()
            .insert((account.to_string(), story_id, chapter_id));
    }

    pub fn submissions(&self) -> Vec<(u64, u64, u128)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentBridge for MockBridge {
    async fn request_accounts(&self) -> Result<Vec<String>, BridgeError> {
        Ok(self.accounts.clone())
    }

    async fn get_network(&self) -> Result<Network, BridgeError> {
        Ok(Network {
            chain_id: Self::CHAIN_ID,
        })
    }

    async fn submit_payment(
        &self,
        from: &str,
        story_id: u64,
        chapter_id: u64,
        value_wei: u128,
    ) -> Result<Receipt, BridgeError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(err) = self.next_failure.lock().unwrap().take() {
            return Err(err);
        }

        self.submissions
            .lock()
            .unwrap()
            .push((story_id, chapter_id, value_wei));
        self.ledger
            .lock()
            .unwrap()
            .insert((from.to_string(), story_id, chapter_id));
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Receipt {
            transaction_hash: format!("0x{n:064x}"),
            block_number: Some(n),
        })
    }

    async fn has_purchased(
        &self,
        account: &str,
        story_id: u64,
        chapter_id: u64,
    ) -> Result<bool, BridgeError> {
        if let Some(err) = self.next_query_failure.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .contains(&(account.to_string(), story_id, chapter_id)))
    }
}

/// Temporary sled store with switchable failures.
pub struct FlakyStore {
    inner: SledRecordStore,
    pub fail_purchase_inserts: AtomicBool,
    pub fail_purchase_reads: AtomicBool,
    pub fail_chapter_reads: AtomicBool,
    pub fail_count_updates: AtomicBool,
    pub purchase_inserts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SledRecordStore::temporary().expect("temporary sled store"),
            fail_purchase_inserts: AtomicBool::new(false),
            fail_purchase_reads: AtomicBool::new(false),
            fail_chapter_reads: AtomicBool::new(false),
            fail_count_updates: AtomicBool::new(false),
            purchase_inserts: AtomicUsize::new(0),
        }
    }

    fn check(flag: &AtomicBool, operation: &str) -> MarketResult<()> {
        if flag.load(Ordering::SeqCst) {
            let cause = std::io::Error::new(std::io::ErrorKind::Other, "store unavailable");
            return Err(MarketError::persistence(operation, cause));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert_category(&self, name: &str) -> MarketResult<Category> {
        self.inner.insert_category(name).await
    }

    async fn find_category_by_name(&self, name: &str) -> MarketResult<Option<Category>> {
        self.inner.find_category_by_name(name).await
    }

    async fn list_categories(&self) -> MarketResult<Vec<Category>> {
        self.inner.list_categories().await
    }

    async fn insert_story(&self, draft: StoryDraft) -> MarketResult<Story> {
        self.inner.insert_story(draft).await
    }

    async fn get_story(&self, story_id: &str) -> MarketResult<Option<Story>> {
        self.inner.get_story(story_id).await
    }

    async fn list_stories(&self) -> MarketResult<Vec<Story>> {
        self.inner.list_stories().await
    }

    async fn update_story_chapter_count(&self, story_id: &str, total: u32) -> MarketResult<()> {
        Self::check(&self.fail_count_updates, "update_story_chapter_count")?;
        self.inner.update_story_chapter_count(story_id, total).await
    }

    async fn insert_chapter(&self, draft: ChapterDraft) -> MarketResult<Chapter> {
        self.inner.insert_chapter(draft).await
    }

    async fn get_chapter(&self, chapter_id: &str) -> MarketResult<Option<Chapter>> {
        self.inner.get_chapter(chapter_id).await
    }

    async fn list_published_chapters(&self, story_id: &str) -> MarketResult<Vec<Chapter>> {
        Self::check(&self.fail_chapter_reads, "list_published_chapters")?;
        self.inner.list_published_chapters(story_id).await
    }

    async fn list_purchases(
        &self,
        user_id: &str,
        story_id: &str,
    ) -> MarketResult<Vec<PurchaseRecord>> {
        Self::check(&self.fail_purchase_reads, "list_purchases")?;
        self.inner.list_purchases(user_id, story_id).await
    }

    async fn insert_purchase(&self, record: &PurchaseRecord) -> MarketResult<()> {
        Self::check(&self.fail_purchase_inserts, "insert_purchase")?;
        self.inner.insert_purchase(record).await?;
        self.purchase_inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn claim_account(&self, account: &str, user_id: &str) -> MarketResult<String> {
        self.inner.claim_account(account, user_id).await
    }

    async fn account_owner(&self, account: &str) -> MarketResult<Option<String>> {
        self.inner.account_owner(account).await
    }
}

pub const AUTHOR: &str = "author-1";
pub const READER: &str = "reader-1";
pub const OTHER_READER: &str = "reader-2";

/// Story S with a free chapter #1 and a paid chapter #2 at 0.001.
pub struct Fixture {
    pub store: Arc<FlakyStore>,
    pub bridge: Arc<MockBridge>,
    pub orchestrator: Arc<PurchaseOrchestrator>,
    pub authoring: StoryAuthoring,
    pub story: Story,
    pub free_chapter: Chapter,
    pub paid_chapter: Chapter,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_bridge(MockBridge::new()).await
    }

    pub async fn with_bridge(bridge: MockBridge) -> Self {
        let store = Arc::new(FlakyStore::new());
        let bridge = Arc::new(bridge);
        let wallet = WalletConnection::new(bridge.clone(), Some(MockBridge::CHAIN_ID));
        let orchestrator = Arc::new(PurchaseOrchestrator::new(
            store.clone(),
            Arc::new(RwLock::new(wallet)),
        ));
        let authoring = StoryAuthoring::new(store.clone());

        authoring.create_category("Fantasy").await.unwrap();
        let story = authoring
            .create_story(
                NewStory {
                    title: "The Salt Road".to_string(),
                    description: "A caravan crosses the dry sea".to_string(),
                    category: "Fantasy".to_string(),
                    price_per_chapter: dec!(0.001),
                },
                AUTHOR,
            )
            .await
            .unwrap();
        let free_chapter = authoring
            .add_chapter(&story.id, new_chapter("Departure", true), AUTHOR)
            .await
            .unwrap();
        let paid_chapter = authoring
            .add_chapter(&story.id, new_chapter("The Dunes", false), AUTHOR)
            .await
            .unwrap();
        let story = store.get_story(&story.id).await.unwrap().unwrap();

        Self {
            store,
            bridge,
            orchestrator,
            authoring,
            story,
            free_chapter,
            paid_chapter,
        }
    }

    pub async fn connect_wallet(&self) {
        self.orchestrator
            .wallet()
            .write()
            .await
            .connect()
            .await
            .unwrap();
    }

    pub fn view(&self, user: Option<&str>) -> ChapterViewController {
        ChapterViewController::new(
            self.story.id.clone(),
            user.map(UserSession::new),
            self.store.clone(),
            self.orchestrator.clone(),
        )
    }
}

pub fn new_chapter(title: &str, is_free: bool) -> NewChapter {
    NewChapter {
        title: title.to_string(),
        content: format!("{title}: the text of the chapter."),
        is_free,
        price: None,
        publish: true,
    }
}
