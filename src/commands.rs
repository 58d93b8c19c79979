//! Command line subcommands.

use chrono::NaiveDate;
use clap::{Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};

use crate::net::Destination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
  Csv,
  Pdf,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
  /// Precache the app shell into the current cache version
  Install,

  /// Evict old cache versions and take control of open pages
  Activate,

  /// Fetch a URL or app path through the worker
  Fetch {
    url: String,

    /// Treat as a page navigation
    #[arg(long)]
    navigate: bool,

    /// What the request is for
    #[arg(long, value_enum, default_value_t = Destination::Empty, conflicts_with = "navigate")]
    dest: Destination,
  },

  /// Replay queued expenses
  Sync {
    /// Sync tag (default: the configured expense sync tag)
    #[arg(long)]
    tag: Option<String>,
  },

  /// List expenses waiting for sync
  Queue,

  /// List cache stores and their entry counts
  Caches,

  /// Create an expense, queueing it when offline
  #[command(alias = "add")]
  AddExpense {
    #[arg(long)]
    title: String,

    #[arg(long)]
    amount: f64,

    #[arg(long)]
    category: String,

    /// YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long, default_value = "")]
    description: String,
  },

  UpdateExpense {
    id: String,

    #[arg(long)]
    title: String,

    #[arg(long)]
    amount: f64,

    #[arg(long)]
    category: String,

    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long, default_value = "")]
    description: String,
  },

  DeleteExpense { id: String },

  /// List expenses, with optional key=value filters
  Expenses { params: Vec<String> },

  Budgets,

  AddBudget {
    #[arg(long)]
    category: String,

    #[arg(long)]
    limit: f64,

    /// YYYY-MM
    #[arg(long)]
    month: String,
  },

  UpdateBudget {
    id: String,

    #[arg(long)]
    category: String,

    #[arg(long)]
    limit: f64,

    #[arg(long)]
    month: String,
  },

  /// Spending analytics, with optional key=value filters
  Analytics { params: Vec<String> },

  /// Download an export file
  Export {
    #[arg(value_enum)]
    format: ExportFormat,

    #[arg(short, long)]
    output: std::path::PathBuf,

    params: Vec<String>,
  },

  /// Turn monthly email reports on or off
  EmailReports {
    #[arg(action = clap::ArgAction::Set)]
    enabled: bool,
  },

  /// Start a login (password from EXPENSE_TRACKER_PASSWORD)
  Login { email: String },

  /// Finish a login with the mailed one-time code
  VerifyOtp { email: String, otp: String },

  /// Show the notification a push message would produce
  Push { payload: Option<String> },

  /// Click a notification action
  Click { action: Option<String> },
}

/// Split `key=value` arguments into query pairs.
pub fn parse_params(args: &[String]) -> Result<Vec<(String, String)>> {
  args
    .iter()
    .map(|arg| {
      arg
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| eyre!("Expected key=value, got '{}'", arg))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    Cli::try_parse_from(std::iter::once("expense-sync").chain(args.iter().copied()))
      .unwrap()
      .command
  }

  #[test]
  fn test_fetch_navigate_flag() {
    assert_eq!(
      parse(&["fetch", "/dashboard", "--navigate"]),
      Command::Fetch {
        url: "/dashboard".to_string(),
        navigate: true,
        dest: Destination::Empty,
      }
    );
  }

  #[test]
  fn test_fetch_destination() {
    assert_eq!(
      parse(&["fetch", "/logo.png", "--dest", "image"]),
      Command::Fetch {
        url: "/logo.png".to_string(),
        navigate: false,
        dest: Destination::Image,
      }
    );
    assert!(Cli::try_parse_from(["expense-sync", "fetch", "/", "--navigate", "--dest", "script"]).is_err());
  }

  #[test]
  fn test_add_alias_and_date() {
    let command = parse(&[
      "add", "--title", "Lunch", "--amount", "12.5", "--category", "Food", "--date", "2024-03-01",
    ]);
    assert_eq!(
      command,
      Command::AddExpense {
        title: "Lunch".to_string(),
        amount: 12.5,
        category: "Food".to_string(),
        date: NaiveDate::from_ymd_opt(2024, 3, 1),
        description: String::new(),
      }
    );
  }

  #[test]
  fn test_email_reports_takes_bool() {
    assert_eq!(
      parse(&["email-reports", "false"]),
      Command::EmailReports { enabled: false }
    );
  }

  #[test]
  fn test_parse_params() {
    let params = parse_params(&["category=Food".to_string(), "search=taxi ride".to_string()]).unwrap();
    assert_eq!(
      params,
      vec![
        ("category".to_string(), "Food".to_string()),
        ("search".to_string(), "taxi ride".to_string()),
      ]
    );
    assert!(parse_params(&["nokey".to_string()]).is_err());
    assert!(parse_params(&["=v".to_string()]).is_err());
  }
}
