use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

use crate::app_state::AppState;
use crate::chapter_view::{ChapterViewController, NotificationLevel, PurchaseOutcome};
use crate::config::{load_config, MarketConfig};
use crate::story::{NewChapter, NewStory, UserSession};
use crate::web::build_router;

/// Top-level CLI interface for storymint
#[derive(Parser)]
#[command(
    name = "storymint",
    version,
    about = "Story marketplace with on-chain chapter purchases"
)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the reader and author HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Manage story categories
    Category {
        #[command(subcommand)]
        action: CategoryCommand,
    },

    /// Create and list stories
    Story {
        #[command(subcommand)]
        action: StoryCommand,
    },

    /// Publish a new chapter
    AddChapter {
        #[arg(long)]
        story: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        title: String,
        /// Chapter text; use --content-file for longer chapters
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,
        #[arg(long)]
        content_file: Option<String>,
        #[arg(long)]
        free: bool,
        /// Overrides the story's per-chapter price (ether)
        #[arg(long)]
        price: Option<Decimal>,
        /// Save without publishing
        #[arg(long)]
        draft: bool,
    },

    /// Show the chapters of a story and what the user can read
    Chapters {
        #[arg(long)]
        story: String,
        #[arg(long)]
        user: Option<String>,
        /// Print the text of every unlocked chapter
        #[arg(long)]
        expand: bool,
    },

    /// Buy a chapter with the configured wallet
    Purchase {
        #[arg(long)]
        story: String,
        #[arg(long)]
        chapter: String,
        #[arg(long)]
        user: String,
    },

    /// Record chapters the ledger says were paid for but have no purchase record
    Reconcile {
        #[arg(long)]
        story: String,
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
pub enum CategoryCommand {
    Add { name: String },
    List,
}

#[derive(Subcommand)]
pub enum StoryCommand {
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        category: String,
        /// Default chapter price in ether
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        author: String,
    },
    List,
}

fn init_tracing(config: &MarketConfig) {
    let level = tracing::Level::from_str(&config.log_level).unwrap_or(tracing::Level::INFO);
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())
        .map_err(|e| anyhow!("failed to load configuration: {e}"))?;
    init_tracing(&config);

    let state = Arc::new(AppState::from_config(config)?);

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| state.config.web.host.clone());
            let port = port.unwrap_or(state.config.web.port);
            let addr = format!("{host}:{port}");

            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            tracing::info!(%addr, "storymint API listening");
            axum::serve(listener, build_router(Arc::clone(&state))).await?;
        }

        Commands::Category { action } => match action {
            CategoryCommand::Add { name } => {
                let category = state.authoring.create_category(&name).await?;
                println!("Category {} created: {}", category.id, category.name);
            }
            CategoryCommand::List => {
                for category in state.authoring.list_categories().await? {
                    println!("{}\t{}", category.id, category.name);
                }
            }
        },

        Commands::Story { action } => match action {
            StoryCommand::Create {
                title,
                description,
                category,
                price,
                author,
            } => {
                let story = state
                    .authoring
                    .create_story(
                        NewStory {
                            title,
                            description,
                            category,
                            price_per_chapter: price,
                        },
                        &author,
                    )
                    .await?;
                println!("Story {} created: {}", story.id, story.title);
            }
            StoryCommand::List => {
                for story in state.store.list_stories().await? {
                    println!(
                        "{}\t{}\t{} chapters\t{} per chapter",
                        story.id, story.title, story.total_chapters, story.price_per_chapter
                    );
                }
            }
        },

        Commands::AddChapter {
            story,
            author,
            title,
            content,
            content_file,
            free,
            price,
            draft,
        } => {
            let content = match (content, content_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {path}"))?,
                (None, None) => return Err(anyhow!("either --content or --content-file is required")),
            };
            let chapter = state
                .authoring
                .add_chapter(
                    &story,
                    NewChapter {
                        title,
                        content,
                        is_free: free,
                        price,
                        publish: !draft,
                    },
                    &author,
                )
                .await?;
            println!(
                "Chapter {} added as #{} of story {}",
                chapter.id, chapter.chapter_number, chapter.story_id
            );
        }

        Commands::Chapters {
            story,
            user,
            expand,
        } => {
            let view = state.chapter_view(&story, user.map(UserSession::new));
            view.refresh_chapters().await?;
            view.refresh_purchases().await?;
            if expand {
                for chapter in view.chapters()? {
                    view.toggle_expanded(&chapter.id)?;
                }
            }
            print_chapters(&view)?;
        }

        Commands::Purchase {
            story,
            chapter,
            user,
        } => {
            state.connect_wallet().await?;
            let view = state.chapter_view(&story, Some(UserSession::new(user)));
            view.refresh_chapters().await?;
            view.refresh_purchases().await?;

            let outcome = view.request_purchase(&chapter).await;
            print_notifications(&view)?;
            match outcome? {
                PurchaseOutcome::Purchased(record) => println!(
                    "Purchased chapter {} (tx {})",
                    record.chapter_id,
                    record.blockchain_tx_hash.as_deref().unwrap_or("-")
                ),
                PurchaseOutcome::AlreadyUnlocked => println!("Chapter {chapter} is already unlocked"),
                PurchaseOutcome::InFlight => println!("A purchase of chapter {chapter} is already pending"),
            }
        }

        Commands::Reconcile { story, user } => {
            state.connect_wallet().await?;
            let session = UserSession::new(user);
            let story = state
                .store
                .get_story(&story)
                .await?
                .ok_or_else(|| anyhow!("story {story} not found"))?;
            let restored = state.orchestrator.reconcile(Some(&session), &story).await?;
            if restored.is_empty() {
                println!("Nothing to reconcile");
            }
            for record in restored {
                println!("Restored purchase of chapter {}", record.chapter_id);
            }
        }
    }

    Ok(())
}

fn print_chapters(view: &ChapterViewController) -> anyhow::Result<()> {
    for chapter in view.render()? {
        let lock = if chapter.is_free {
            "free".to_string()
        } else if chapter.unlocked {
            "owned".to_string()
        } else {
            format!("locked, {}", chapter.price)
        };
        println!("#{} {} [{}] ({})", chapter.chapter_number, chapter.title, chapter.id, lock);
        if let Some(content) = chapter.content {
            println!("{content}\n");
        }
    }
    print_notifications(view)
}

fn print_notifications(view: &ChapterViewController) -> anyhow::Result<()> {
    for note in view.drain_notifications()? {
        match note.level {
            NotificationLevel::Success => println!("✅ {}", note.message),
            NotificationLevel::Error => eprintln!("❌ [{}] {}", note.category, note.message),
        }
    }
    Ok(())
}
