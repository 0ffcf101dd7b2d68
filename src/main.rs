use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;

use vitalscan::chat::{generate_title, ChatAssistant, ChatRequest};
use vitalscan::config::AnalyzerConfig;
use vitalscan::pipeline::analysis::{AnalysisRequest, ModelCursor, ReportAnalyzer, UserProfile};

/// Lab report analysis and wellness chat backed by OpenRouter models
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ~/VitalScan/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a plain-text lab report
    Analyze {
        /// Report text file
        file: PathBuf,

        /// User profile JSON file
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Index in the model list to start from
        #[arg(long, default_value = "0")]
        start_model: usize,
    },

    /// Ask the wellness assistant a question
    Chat {
        message: String,

        /// User profile JSON file
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Previous analysis result JSON file
        #[arg(long)]
        analysis: Option<PathBuf>,

        /// Index in the model list to start from
        #[arg(long, default_value = "0")]
        start_model: usize,
    },

    /// Print the configured model fallback order
    Models,
}

fn main() -> Result<()> {
    let args = Args::parse();
    vitalscan::init_logging();

    let config = AnalyzerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Analyze { file, profile, start_model } => {
            config.validate().context("Configuration is incomplete")?;

            let report_text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read report {}", file.display()))?;
            let mut request = AnalysisRequest::new(report_text);
            if let Some(path) = profile {
                request = request.with_profile(read_json::<UserProfile>(&path)?);
            }

            let analyzer = ReportAnalyzer::from_config(&config)?;
            let outcome = analyzer.analyze(&request, ModelCursor::new(start_model))?;
            print_json(&outcome)?;
        }
        Command::Chat { message, profile, analysis, start_model } => {
            config.validate().context("Configuration is incomplete")?;

            let request = ChatRequest {
                user_profile: profile.as_deref().map(read_json).transpose()?,
                latest_analysis: analysis.as_deref().map(read_json).transpose()?,
                message,
                history: Vec::new(),
            };

            let assistant = ChatAssistant::from_config(&config)?;
            let reply = assistant.reply(&request, ModelCursor::new(start_model))?;
            print_json(&json!({
                "title": generate_title(&request.message),
                "reply": reply,
            }))?;
        }
        Command::Models => {
            print_json(&json!({
                "baseUrl": config.base_url,
                "models": config.models,
                "fallbackOnTimeout": config.fallback_on_timeout,
            }))?;
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
