use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use inbox_types::{
    CreateMessageRequest, MessageResponse, NewAttachmentRequest, StatusResponse, SummarizeRequest,
    SummaryResponse, SyncResponse,
};
use reqwest::Client;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "inbox-cli")]
#[command(about = "Operator CLI for the collegiate inbox backend")]
#[command(
    long_about = "A command-line interface for the inbox backend server.\n\n\
    Lists and creates inbox items, triggers context broadcasts and Google syncs,\n\
    and requests message summaries."
)]
struct Cli {
    /// Backend server URL to connect to.
    #[arg(
        short,
        long,
        default_value = "http://localhost:8000",
        env = "INBOX_API_URL"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Broadcast a fresh context snapshot to every connected client
    Refresh,
    /// List or create inbox items
    Messages {
        #[command(subcommand)]
        action: MessageAction,
    },
    /// Summarize a message with the configured language model
    Summarize {
        /// The UUID of the message to summarize.
        id: Uuid,

        /// Upper bound on summary length.
        #[arg(short = 'n', long, value_name = "N")]
        sentences: Option<u8>,
    },
    /// Pull new Classroom coursework and Gmail messages now
    Sync,
}

#[derive(Subcommand)]
enum MessageAction {
    /// List the most recent items, newest first
    List {
        /// Maximum number of items to show.
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Create a manual inbox item
    ///
    /// Connected clients receive it immediately as an `item:new` event.
    Create {
        /// Title shown in the inbox.
        title: String,

        /// Short preview text.
        #[arg(short, long, value_name = "TEXT")]
        snippet: Option<String>,

        /// Full body text; used for summaries.
        #[arg(short, long, value_name = "TEXT")]
        body: Option<String>,

        /// Due date in RFC 3339 format, e.g. 2025-10-17T23:59:00Z.
        #[arg(short, long, value_name = "DATETIME")]
        due: Option<DateTime<Utc>>,

        /// Course UUID to file the item under.
        #[arg(short, long, value_name = "UUID")]
        course: Option<Uuid>,

        /// Attachment link; may be repeated.
        #[arg(short, long = "attach", value_name = "URL")]
        attachments: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = cli.base_url.trim_end_matches('/');

    match cli.command {
        Commands::Refresh => {
            let status: StatusResponse = client
                .post(format!("{}/api/mcp/refresh", base_url))
                .send()
                .await?
                .error_for_status()
                .context("Refresh failed")?
                .json()
                .await?;
            println!("Context refresh: {}", status.status);
        }
        Commands::Messages { action } => handle_messages(&client, base_url, action).await?,
        Commands::Summarize { id, sentences } => {
            let req = SummarizeRequest {
                max_sentences: sentences,
            };
            let summary: SummaryResponse = client
                .post(format!("{}/api/messages/{}/summarize", base_url, id))
                .json(&req)
                .send()
                .await?
                .error_for_status()
                .context("Summarize failed")?
                .json()
                .await?;
            println!("{}", summary.summary);
        }
        Commands::Sync => {
            let stats: SyncResponse = client
                .post(format!("{}/api/sync", base_url))
                .send()
                .await?
                .error_for_status()
                .context("Sync failed")?
                .json()
                .await?;
            println!(
                "Synced {} users, {} new items",
                stats.users, stats.new_items
            );
        }
    }

    Ok(())
}

async fn handle_messages(
    client: &Client,
    base_url: &str,
    action: MessageAction,
) -> anyhow::Result<()> {
    let url = format!("{}/api/messages", base_url);

    match action {
        MessageAction::List { limit } => {
            let items: Vec<MessageResponse> = client
                .get(&url)
                .query(&[("limit", limit)])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if items.is_empty() {
                println!("No messages found.");
            } else {
                for item in items {
                    println!(
                        "[{}] ({}) {}",
                        &item.id.to_string()[..8],
                        item.source,
                        item.title.as_deref().unwrap_or("(untitled)")
                    );
                    if let Some(due) = item.due_datetime {
                        println!("    Due: {}", due.to_rfc3339());
                    }
                    for file in &item.attachments {
                        println!("    Attachment: {}", file.name);
                    }
                }
            }
        }
        MessageAction::Create {
            title,
            snippet,
            body,
            due,
            course,
            attachments,
        } => {
            let req = CreateMessageRequest {
                title,
                snippet,
                body,
                message_type: Some("manual".to_string()),
                due_datetime: due,
                course_id: course,
                attachments: attachments
                    .into_iter()
                    .map(|url| NewAttachmentRequest {
                        name: url.rsplit('/').next().unwrap_or(&url).to_string(),
                        mime_type: None,
                        url: Some(url),
                    })
                    .collect(),
            };
            let item: MessageResponse = client
                .post(&url)
                .json(&req)
                .send()
                .await?
                .error_for_status()
                .context("Create failed")?
                .json()
                .await?;
            println!(
                "Created message: [{}] {}",
                &item.id.to_string()[..8],
                item.title.as_deref().unwrap_or_default()
            );
        }
    }

    Ok(())
}
