use crate::api::{ApiClient, Budget, CreateOutcome, Session};
use crate::cache::{CacheLayer, CacheStorage, SqliteStorage};
use crate::clients::{ClientId, Clients};
use crate::commands::{parse_params, Command, ExportFormat};
use crate::config::Config;
use crate::db::Database;
use crate::event::{EventHandler, EventOutcome, WorkerEvent};
use crate::net::{fetch_with_timeout, Destination, HttpFetcher, Request};
use crate::notify::ClickOutcome;
use crate::queue::{MutationQueue, NewExpense, SqliteQueue};
use crate::worker::{FetchOutcome, OfflineWorker, WorkerSettings};
use chrono::{Local, NaiveDate};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

pub type Worker = OfflineWorker<SqliteStorage, HttpFetcher, SqliteQueue>;

/// Command line host: one worker, one page holding the session.
pub struct App {
  config: Config,

  worker: Arc<Worker>,

  /// Event loop running the worker
  events: EventHandler,

  /// Page-side API client
  api: ApiClient<HttpFetcher, SqliteQueue>,

  storage: Arc<SqliteStorage>,
  queue: Arc<SqliteQueue>,

  /// Sends requests the worker does not intercept
  fetcher: Arc<HttpFetcher>,

  /// The page this process stands in for
  page: ClientId,
  page_task: JoinHandle<()>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let db = Arc::new(Database::open(&config.database_path()?)?);
    Self::with_database(config, db)
  }

  pub fn with_database(config: Config, db: Arc<Database>) -> Result<Self> {
    let storage = Arc::new(SqliteStorage::new(db.clone()));
    let queue = Arc::new(SqliteQueue::new(db));
    let fetcher = Arc::new(HttpFetcher::new(
      config.origin_url()?,
      config.fetch_timeout(),
    )?);
    let clients = Arc::new(Clients::new());

    let worker = Arc::new(OfflineWorker::new(
      CacheLayer::new(storage.clone(), config.cache_name.clone()),
      fetcher.clone(),
      queue.clone(),
      clients.clone(),
      WorkerSettings::from_config(&config)?,
    ));
    worker.resume()?;

    let session = Arc::new(Session::new(Config::get_token()));
    let (page, rx) = clients.connect(config.origin_url()?);
    let page_task = session.clone().serve(rx);

    let events = EventHandler::spawn(worker.clone());
    let api = ApiClient::new(
      events.sender(),
      fetcher.clone(),
      queue.clone(),
      session,
      &config,
    )?;

    Ok(Self {
      config,
      worker,
      events,
      api,
      storage,
      queue,
      fetcher,
      page,
      page_task,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Install => self.install().await,
      Command::Activate => self.activate().await,
      Command::Fetch {
        url,
        navigate,
        dest,
      } => self.fetch(&url, navigate, dest).await,
      Command::Sync { tag } => self.sync(tag).await,
      Command::Queue => self.show_queue(),
      Command::Caches => self.show_caches(),
      Command::AddExpense {
        title,
        amount,
        category,
        date,
        description,
      } => {
        if !self.api.session().is_authenticated() {
          warn!("No session token, set EXPENSE_TRACKER_TOKEN or run verify-otp");
        }
        let expense = new_expense(title, amount, category, date, description);
        match self.api.create_expense(expense).await? {
          CreateOutcome::Created(created) => print_json(&created),
          CreateOutcome::Queued(pending) => {
            println!(
              "Offline: expense {} queued, it will sync when back online",
              pending.id
            );
            Ok(())
          }
        }
      }
      Command::UpdateExpense {
        id,
        title,
        amount,
        category,
        date,
        description,
      } => {
        let expense = new_expense(title, amount, category, date, description);
        print_json(&self.api.update_expense(&id, &expense).await?)
      }
      Command::DeleteExpense { id } => {
        self.api.delete_expense(&id).await?;
        println!("Deleted expense {}", id);
        Ok(())
      }
      Command::Expenses { params } => {
        let params = parse_params(&params)?;
        print_json(&self.api.get_expenses(&borrow_pairs(&params)).await?)
      }
      Command::Budgets => print_json(&self.api.get_budgets().await?),
      Command::AddBudget {
        category,
        limit,
        month,
      } => {
        let budget = Budget {
          category,
          limit,
          month,
        };
        print_json(&self.api.create_budget(&budget).await?)
      }
      Command::UpdateBudget {
        id,
        category,
        limit,
        month,
      } => {
        let budget = Budget {
          category,
          limit,
          month,
        };
        print_json(&self.api.update_budget(&id, &budget).await?)
      }
      Command::Analytics { params } => {
        let params = parse_params(&params)?;
        print_json(&self.api.get_analytics(&borrow_pairs(&params)).await?)
      }
      Command::Export {
        format,
        output,
        params,
      } => {
        let params = parse_params(&params)?;
        let pairs = borrow_pairs(&params);
        let bytes = match format {
          ExportFormat::Csv => self.api.export_csv(&pairs).await?,
          ExportFormat::Pdf => self.api.export_pdf(&pairs).await?,
        };
        std::fs::write(&output, &bytes)
          .map_err(|e| eyre!("Failed to write {}: {}", output.display(), e))?;
        println!("Wrote {} bytes to {}", bytes.len(), output.display());
        Ok(())
      }
      Command::EmailReports { enabled } => {
        print_json(&self.api.toggle_email_reports(enabled).await?)
      }
      Command::Login { email } => {
        let password = Config::get_password()?;
        let auth = self.api.login(&email, &password).await?;
        if auth.success {
          println!("Login successful! Check your email for the one-time code.");
        } else {
          println!("{}", auth.message.as_deref().unwrap_or("Login failed"));
        }
        Ok(())
      }
      Command::VerifyOtp { email, otp } => {
        let auth = self.api.verify_otp(&email, &otp).await?;
        match auth.token.filter(|_| auth.success) {
          Some(token) => {
            println!("Verified. Export the session token to reuse it:");
            println!("EXPENSE_TRACKER_TOKEN={}", token);
          }
          None => println!("{}", auth.message.as_deref().unwrap_or("Invalid code")),
        }
        Ok(())
      }
      Command::Push { payload } => {
        match self.events.sender().dispatch(WorkerEvent::Push { payload }).await? {
          EventOutcome::Notification(notification) => print_json(&notification),
          other => Err(eyre!("Unexpected outcome {:?}", other)),
        }
      }
      Command::Click { action } => {
        match self
          .events
          .sender()
          .dispatch(WorkerEvent::NotificationClick { action })
          .await?
        {
          EventOutcome::Click(ClickOutcome::Dismissed) => println!("Notification closed"),
          EventOutcome::Click(ClickOutcome::Window(action)) => println!("{:?}", action),
          other => return Err(eyre!("Unexpected outcome {:?}", other)),
        }
        Ok(())
      }
    }
  }

  /// Install, then activate right away since install skips waiting.
  async fn install(&self) -> Result<()> {
    self.events.sender().dispatch(WorkerEvent::Install).await?;
    println!("Installed {}", self.config.cache_name);

    if self.worker.skips_waiting() {
      self.activate().await?;
    }
    Ok(())
  }

  async fn activate(&self) -> Result<()> {
    if let EventOutcome::Activated { evicted } =
      self.events.sender().dispatch(WorkerEvent::Activate).await?
    {
      for name in evicted {
        println!("Deleted old cache {}", name);
      }
    }
    println!(
      "Activated {}, controlling {} page(s)",
      self.config.cache_name,
      self.worker.clients().match_all().len()
    );
    Ok(())
  }

  async fn fetch(&self, target: &str, navigate: bool, dest: Destination) -> Result<()> {
    let url = match Url::parse(target) {
      Ok(url) => url,
      Err(_) => self.config.resolve(target)?,
    };
    let request = if navigate {
      Request::navigate(url)
    } else {
      Request::get(url).with_destination(dest)
    };

    match self.events.sender().fetch(request.clone()).await? {
      FetchOutcome::Respond(result) => {
        match result.cached_at {
          Some(at) => eprintln!(
            "{} {} ({}, cached {})",
            result.data.status,
            result.data.status_text,
            result.source,
            at.format("%Y-%m-%d %H:%M:%S UTC")
          ),
          None => eprintln!(
            "{} {} ({})",
            result.data.status, result.data.status_text, result.source
          ),
        }
        println!("{}", result.data.text());
      }
      FetchOutcome::Passthrough => {
        warn!(phase = ?self.worker.phase(), "Worker not active, fetching directly");
        let response =
          fetch_with_timeout(self.fetcher.as_ref(), &request, self.config.fetch_timeout()).await?;
        eprintln!("{} {} (not intercepted)", response.status, response.status_text);
        println!("{}", response.text());
      }
    }
    Ok(())
  }

  async fn sync(&self, tag: Option<String>) -> Result<()> {
    let tag = tag.unwrap_or_else(|| self.worker.settings().sync_tag.clone());
    match self
      .events
      .sender()
      .dispatch(WorkerEvent::Sync { tag: tag.clone() })
      .await?
    {
      EventOutcome::Synced(Some(report)) => {
        println!(
          "Synced {} of {} queued expense(s)",
          report.synced.len(),
          report.attempted
        );
        for id in report.failed {
          println!("  still queued: {}", id);
        }
      }
      EventOutcome::Synced(None) => println!("Nothing registered for tag {}", tag),
      other => return Err(eyre!("Unexpected outcome {:?}", other)),
    }
    Ok(())
  }

  fn show_queue(&self) -> Result<()> {
    let pending = self.queue.pending()?;
    if pending.is_empty() {
      println!("No expenses waiting for sync");
    }
    for expense in pending {
      println!("{}", serde_json::to_string(&expense)?);
    }
    Ok(())
  }

  fn show_caches(&self) -> Result<()> {
    println!("Worker {:?}", self.worker.phase());
    let current = self.worker.cache().cache_name();
    for name in self.storage.cache_names()? {
      let marker = if name == current { "*" } else { " " };
      println!("{} {} ({} entries)", marker, name, self.storage.keys(&name)?.len());
    }
    Ok(())
  }

  /// Stop the worker and wait for in-flight events to finish.
  pub async fn shutdown(self) {
    let App {
      worker,
      events,
      api,
      page,
      page_task,
      ..
    } = self;

    let online = api.is_online();
    drop(api);
    worker.shutdown();
    worker.clients().disconnect(page);
    events.shutdown().await;
    let _ = page_task.await;
    info!(online, "Shut down");
  }
}

fn new_expense(
  title: String,
  amount: f64,
  category: String,
  date: Option<NaiveDate>,
  description: String,
) -> NewExpense {
  NewExpense {
    title,
    amount,
    category,
    date: date.unwrap_or_else(|| Local::now().date_naive()),
    description,
  }
}

fn borrow_pairs(params: &[(String, String)]) -> Vec<(&str, &str)> {
  params
    .iter()
    .map(|(k, v)| (k.as_str(), v.as_str()))
    .collect()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
