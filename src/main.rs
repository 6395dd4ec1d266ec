use clap::{Parser, Subcommand};
use medrag::Result;
use medrag::commands::{ingest, query, reset, show_config, sources, status};
use medrag::query::DEFAULT_K;

#[derive(Parser)]
#[command(name = "medrag")]
#[command(about = "Retrieval-augmented question answering over authoritative medical sources")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape and index a topic's sources ("all" ingests every topic)
    Ingest {
        /// Topic to ingest, or "all"
        topic: String,
        /// Re-fetch sources that were already scraped
        #[arg(long)]
        force: bool,
    },
    /// Show what has been scraped so far
    Status,
    /// Forget scrape history for a topic (or everything)
    Reset {
        /// Topic to reset; omit to reset all topics
        topic: Option<String>,
    },
    /// Ask a question against an ingested topic
    Query {
        /// The question to answer
        question: String,
        /// Topic collection to search (defaults to menopause)
        #[arg(long)]
        topic: Option<String>,
        /// Number of passages to retrieve
        #[arg(long, default_value_t = DEFAULT_K)]
        k: usize,
        /// Print the answer incrementally as it is generated
        #[arg(long)]
        stream: bool,
    },
    /// Show the passages retrieval would use for a question
    Sources {
        /// The question to look up
        question: String,
        /// Topic collection to search (defaults to menopause)
        #[arg(long)]
        topic: Option<String>,
        /// Number of passages to retrieve
        #[arg(long, default_value_t = DEFAULT_K)]
        k: usize,
    },
    /// Show the active configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { topic, force } => {
            ingest(topic, force).await?;
        }
        Commands::Status => {
            status()?;
        }
        Commands::Reset { topic } => {
            reset(topic)?;
        }
        Commands::Query {
            question,
            topic,
            k,
            stream,
        } => {
            query(question, topic, k, stream).await?;
        }
        Commands::Sources { question, topic, k } => {
            sources(question, topic, k).await?;
        }
        Commands::Config { show: _ } => {
            show_config()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["medrag", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn ingest_command_with_topic() {
        let cli = Cli::try_parse_from(["medrag", "ingest", "menopause"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { topic, force } = parsed.command {
                assert_eq!(topic, "menopause");
                assert!(!force);
            }
        }
    }

    #[test]
    fn ingest_command_with_force() {
        let cli = Cli::try_parse_from(["medrag", "ingest", "all", "--force"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { topic, force } = parsed.command {
                assert_eq!(topic, "all");
                assert!(force);
            }
        }
    }

    #[test]
    fn query_command_defaults() {
        let cli = Cli::try_parse_from(["medrag", "query", "When does perimenopause start?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query {
                question,
                topic,
                k,
                stream,
            } = parsed.command
            {
                assert_eq!(question, "When does perimenopause start?");
                assert_eq!(topic, None);
                assert_eq!(k, DEFAULT_K);
                assert!(!stream);
            }
        }
    }

    #[test]
    fn query_command_with_options() {
        let cli = Cli::try_parse_from([
            "medrag",
            "query",
            "What is a mammogram?",
            "--topic",
            "breast_cancer",
            "--k",
            "8",
            "--stream",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query {
                question,
                topic,
                k,
                stream,
            } = parsed.command
            {
                assert_eq!(question, "What is a mammogram?");
                assert_eq!(topic, Some("breast_cancer".to_string()));
                assert_eq!(k, 8);
                assert!(stream);
            }
        }
    }

    #[test]
    fn reset_command_without_topic() {
        let cli = Cli::try_parse_from(["medrag", "reset"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Reset { topic } = parsed.command {
                assert_eq!(topic, None);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["medrag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["medrag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
