use clap::{Parser, Subcommand, ValueEnum};
use chrono::Utc;
use pdf_chat_core::llm::{DEFAULT_CHAT_MODEL, DEFAULT_OPENAI_BASE_URL, DEFAULT_TEMPERATURE};
use pdf_chat_core::{
    excerpt_pages, CharacterNgramEmbedder, ChatSession, Conversation, Embedder,
    HuggingFaceEmbedder, OpenAiChatModel, OpenAiConfig, OpenAiEmbedder, PipelineError,
    PipelineOptions, QueryResult,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Session = ChatSession<Box<dyn Embedder>, OpenAiChatModel>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Offline character-trigram hashing.
    Local,
    /// OpenAI embeddings API.
    Openai,
    /// Hugging Face inference API (all-MiniLM-L6-v2).
    Huggingface,
}

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Embedding provider used for both indexing and questions.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Local)]
    embedder: EmbedderKind,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    openai_base_url: String,

    /// Chat completion model
    #[arg(long, default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Sampling temperature for answers
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Hugging Face API token
    #[arg(long, env = "HUGGINGFACEHUB_API_TOKEN", hide_env_values = true)]
    huggingface_token: Option<String>,

    /// Maximum characters per chunk.
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Characters repeated between neighbouring chunks.
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,

    /// Number of passages retrieved per question.
    #[arg(long, default_value = "2")]
    top_k: usize,

    /// Prior turns replayed to the model.
    #[arg(long, default_value = "6")]
    history_turns: usize,

    /// Rewrite follow-up questions into standalone ones before retrieval.
    #[arg(long, default_value_t = false)]
    condense: bool,

    /// Leave answers uncited when the best passage scores below this similarity.
    #[arg(long)]
    min_citation_score: Option<f32>,

    /// Timeout for each provider request, in seconds.
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    /// Print the retrieved passages under each answer.
    #[arg(long, default_value_t = false)]
    show_sources: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Process a PDF and answer a single question.
    Ask {
        /// PDF file to chat with.
        #[arg(long)]
        pdf: PathBuf,
        /// Question about the document.
        #[arg(long)]
        question: String,
        /// Write the pages around the cited page to this PDF file.
        #[arg(long)]
        excerpt_out: Option<PathBuf>,
        /// Pages kept on each side of the cited page in the excerpt.
        #[arg(long, default_value = "2")]
        excerpt_radius: u32,
    },
    /// Process a PDF and answer questions read from stdin.
    Chat {
        /// PDF file to chat with.
        #[arg(long)]
        pdf: PathBuf,
        /// Save the conversation as JSON when the session ends.
        #[arg(long)]
        history_out: Option<PathBuf>,
        /// Continue a conversation previously saved with --history-out.
        #[arg(long)]
        resume_history: Option<PathBuf>,
    },
}

impl Cli {
    fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            chunk_max_chars: self.chunk_size,
            chunk_overlap_chars: self.chunk_overlap,
            top_k: self.top_k,
            history_turns: self.history_turns,
            condense_follow_ups: self.condense,
            min_citation_score: self.min_citation_score,
            ..PipelineOptions::default()
        }
    }

    fn openai_config(&self) -> anyhow::Result<OpenAiConfig> {
        let api_key = self
            .openai_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is required to generate answers"))?;

        let mut config = OpenAiConfig::new(api_key);
        config.base_url = self.openai_base_url.clone();
        config.chat_model = self.chat_model.clone();
        config.temperature = self.temperature;
        config.timeout = Duration::from_secs(self.timeout_secs);
        Ok(config)
    }

    fn build_embedder(&self, openai: &OpenAiConfig) -> Result<Box<dyn Embedder>, PipelineError> {
        Ok(match self.embedder {
            EmbedderKind::Local => Box::new(CharacterNgramEmbedder::default()),
            EmbedderKind::Openai => Box::new(OpenAiEmbedder::new(openai)?),
            EmbedderKind::Huggingface => Box::new(HuggingFaceEmbedder::new(
                self.huggingface_token.clone(),
                Duration::from_secs(self.timeout_secs),
            )?),
        })
    }

    fn build_session(&self) -> anyhow::Result<Session> {
        let openai = self.openai_config()?;
        let embedder = self
            .build_embedder(&openai)
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
        let chat =
            OpenAiChatModel::new(openai).map_err(|error| anyhow::anyhow!(error.to_string()))?;
        Ok(ChatSession::new(embedder, chat, self.pipeline_options()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut session = cli.build_session()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        embedder = ?cli.embedder,
        "pdf-chat boot"
    );

    match &cli.command {
        Command::Ask {
            pdf,
            question,
            excerpt_out,
            excerpt_radius,
        } => {
            let bytes = load_pdf(&mut session, pdf).await?;

            let result = session
                .ask(question)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            print_answer(&result, cli.show_sources);

            if let (Some(path), Some(page)) = (excerpt_out, result.cited_page_index) {
                let excerpt = excerpt_pages(&bytes, page, *excerpt_radius)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                tokio::fs::write(path, &excerpt.pdf).await?;
                println!(
                    "excerpt: pages {}-{} written to {} (cited page is #{} in the excerpt)",
                    excerpt.first_page_index + 1,
                    excerpt.first_page_index + excerpt.page_count,
                    path.display(),
                    excerpt.cited_offset + 1
                );
            }
        }
        Command::Chat {
            pdf,
            history_out,
            resume_history,
        } => {
            load_pdf(&mut session, pdf).await?;

            if let Some(path) = resume_history {
                let conversation = Conversation::load_json(path)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                info!(turns = conversation.len(), path = %path.display(), "resuming conversation");
                session
                    .restore_conversation(conversation)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            }

            run_chat_loop(&mut session, pdf, cli.show_sources).await?;

            if let Some(path) = history_out {
                if let Some(conversation) = session.conversation() {
                    conversation
                        .save_json(path)
                        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                    println!("{} turns saved to {}", conversation.len(), path.display());
                }
            }
        }
    }

    Ok(())
}

async fn load_pdf(session: &mut Session, path: &Path) -> anyhow::Result<Vec<u8>> {
    let bytes = tokio::fs::read(path).await?;
    let title = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document.pdf")
        .to_string();

    let document = session
        .process_document(bytes.clone(), &title)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let blank_pages = document
        .pages
        .iter()
        .filter(|page| page.text.trim().is_empty())
        .count();
    if blank_pages > 0 {
        warn!(blank_pages, title = %title, "some pages have no extractable text");
    }

    println!(
        "Done processing {} ({} pages). You may now ask a question.",
        title,
        document.page_count()
    );
    Ok(bytes)
}

async fn run_chat_loop(session: &mut Session, pdf: &Path, show_sources: bool) -> anyhow::Result<()> {
    println!("Type a question, :history, :reload or :quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            ":quit" | ":q" => break,
            ":history" => {
                if let Some(conversation) = session.conversation() {
                    for turn in conversation.all() {
                        println!("[{}] you: {}", turn.asked_at.to_rfc3339(), turn.question);
                        println!("    bot: {}", turn.answer);
                    }
                }
            }
            ":reload" => {
                if let Err(error) = load_pdf(session, pdf).await {
                    warn!(%error, "reload failed; keeping the previous document");
                    println!("reload failed: {error}");
                }
            }
            question => match session.ask(question).await {
                Ok(result) => print_answer(&result, show_sources),
                Err(PipelineError::IndexNotReady) => {
                    println!("Please upload and process a PDF first before asking a question.");
                }
                Err(error) => {
                    warn!(%error, "question failed");
                    println!("error: {error}");
                }
            },
        }
    }

    Ok(())
}

fn print_answer(result: &QueryResult, show_sources: bool) {
    println!("{}", result.answer);
    match result.display_page() {
        Some(page) => println!("  (source: page {page})"),
        None => println!("  (no page cited)"),
    }

    if show_sources {
        for (position, source) in result.sources.iter().enumerate() {
            println!(
                "  [{}] page={} score={:.4}\n{}",
                position + 1,
                source.chunk.page_index + 1,
                source.score,
                source.chunk.text
            );
        }
    }
}
