//! `shelf` command-line entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shelf_client::{AppError, ClientConfig, ShelfClient};
use shelf_core::{Book, BookId, Credentials, ProgressUpdate, ReadingStatus, TrackedBook};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shelf")]
#[command(author, version, about = "Track your reading library from the terminal")]
struct Cli {
    /// Path to the client config file
    #[arg(long, env = "SHELF_CONFIG", value_name = "PATH")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Resync and print the tracked library
    Library,

    /// Start tracking a book
    Track {
        book_id: u64,
        #[arg(default_value_t = ReadingStatus::PlanToRead)]
        status: ReadingStatus,
    },

    /// Stop tracking a book
    Untrack { book_id: u64 },

    /// Record the chapter you are on
    Progress { book_id: u64, chapter: u32 },

    /// Store a credential pair and load the library
    Login {
        access_token: String,
        refresh_token: String,
    },

    /// Forget the stored credentials
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("shelf_client=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load(&cli.config)?;
    let client = ShelfClient::connect(&config).await?;

    match cli.command {
        Command::Library => {
            let library = client.library().resync(true).await?;
            let mut books: Vec<&TrackedBook> = library.values().collect();
            books.sort_by_key(|book| book.book_id);
            for book in books {
                print_book(book);
            }
        }
        Command::Track { book_id, status } => {
            let book = Book {
                book_id: BookId::new(book_id),
                title: String::new(),
                total_chapters: None,
                total_volumes: None,
            };
            print_book(&client.library().track(&book, status).await?);
        }
        Command::Untrack { book_id } => {
            let book_id = BookId::new(book_id);
            client.library().resync(false).await?;
            client.library().untrack(book_id).await?;
            println!("{} untracked", book_id);
        }
        Command::Progress { book_id, chapter } => {
            let book_id = BookId::new(book_id);
            client.library().resync(false).await?;
            let updated = client
                .library()
                .update_progress(book_id, ProgressUpdate::chapter(chapter))
                .await?;
            print_book(&updated);
        }
        Command::Login {
            access_token,
            refresh_token,
        } => {
            client
                .sign_in(&Credentials::new(access_token, refresh_token))
                .await?;
            println!("Signed in, {} books tracked", client.library().len());
        }
        Command::Logout => {
            client.sign_out().await?;
            println!("Signed out");
        }
    }

    client.settle().await;
    Ok(())
}

fn print_book(book: &TrackedBook) {
    let chapter = book
        .current_chapter
        .map(|chapter| match book.total_chapters {
            Some(total) => format!("ch. {}/{}", chapter, total),
            None => format!("ch. {}", chapter),
        })
        .unwrap_or_default();
    println!(
        "{:>12}  {:<12}  {}",
        book.book_id.to_string(),
        book.status.as_str(),
        chapter
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("shelf").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_flag() {
        let cli = parse(&["--config", "shelf.toml", "library"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("shelf.toml"));
        assert_eq!(cli.command, Command::Library);
    }

    #[test]
    fn test_track_with_and_without_status() {
        assert_eq!(
            parse(&["--config", "c", "track", "42"]).unwrap().command,
            Command::Track {
                book_id: 42,
                status: ReadingStatus::PlanToRead
            }
        );
        assert_eq!(
            parse(&["--config", "c", "track", "42", "reading"])
                .unwrap()
                .command,
            Command::Track {
                book_id: 42,
                status: ReadingStatus::Reading
            }
        );
    }

    #[test]
    fn test_progress() {
        assert_eq!(
            parse(&["--config", "c", "progress", "7", "12"])
                .unwrap()
                .command,
            Command::Progress {
                book_id: 7,
                chapter: 12
            }
        );
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        assert!(parse(&["--config", "c", "track", "abc"]).is_err());
        assert!(parse(&["--config", "c", "track", "1", "finished"]).is_err());
        assert!(parse(&["--config", "c", "progress", "1"]).is_err());
        assert!(parse(&["--config", "c"]).is_err());
    }
}
