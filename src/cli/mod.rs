//! Command-line interface for the ToolShare marketplace.

mod render;

use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use futures::future::select_all;
use tokio::sync::watch;
use tracing::debug;

use crate::api::{upload, ApiClient, HttpTransport, ImgbbUploader, PendingImage};
use crate::config::Config;
use crate::guard::{
    tool_path, Navigation, RouteGuard, DASHBOARD_PATH, LOGIN_PATH, MY_RESERVATIONS_PATH,
    MY_TOOLS_PATH, REGISTER_PATH,
};
use crate::models::{
    NewUser, NotificationId, Reservation, ReservationId, ReservationStatus, ToolForm, ToolId,
    ToolStatus, ToolUpdate,
};
use crate::mutations::{Acknowledgment, MutationError, MutationHandler};
use crate::poller::{
    fetch_tool_detail, fetch_user_directory, CollectionSource, CollectionStore,
    NotificationsSource, PollDriver, PollOptions, Poller, ReservationsSource, ToolsSource,
};
use crate::session::{AuthenticatedSession, Credentials, SessionStatus, SessionStore};
use crate::views::{self, Dashboard, ReservationTab};

#[derive(Parser)]
#[command(name = "toolshare")]
#[command(author, version, about = "ToolShare - rent tools from your neighbours", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "toolshare.toml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Backend URL (overrides the config file)
    #[arg(long, env = "TOOLSHARE_API_URL", global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and remember the session
    Login {
        /// Account email
        email: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "TOOLSHARE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the current session
    Logout,
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        cpf: String,
        #[arg(long)]
        address: String,
        #[arg(long, allow_hyphen_values = true)]
        latitude: String,
        #[arg(long, allow_hyphen_values = true)]
        longitude: String,
        /// URL of an already uploaded profile picture
        #[arg(long, conflicts_with = "image_file")]
        image: Option<String>,
        /// Profile picture to upload
        #[arg(long)]
        image_file: Option<PathBuf>,
    },
    /// Show the signed-in user
    Whoami,
    /// Available and rented tools
    Dashboard {
        /// Keep polling and redraw on changes
        #[arg(short, long)]
        watch: bool,
    },
    /// Tool listings
    Tools {
        #[command(subcommand)]
        command: ToolCommands,
    },
    /// Reservations made and received
    Reservations {
        #[command(subcommand)]
        command: ReservationCommands,
    },
    /// Notifications for the signed-in user
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },
    /// Upload an image and print its URL
    Upload {
        file: PathBuf,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ToolCommands {
    /// Your available listings
    Mine,
    /// List a new tool
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        /// Price per hour
        #[arg(long)]
        price: f64,
        #[arg(long)]
        category: String,
        /// disponível, alugada or em manutenção
        #[arg(long, default_value = "disponível", value_parser = parse_tool_status)]
        status: ToolStatus,
        #[arg(long, conflicts_with = "image_file")]
        image: Option<String>,
        #[arg(long)]
        image_file: Option<PathBuf>,
    },
    /// Show a tool and its owner
    Show {
        id: ToolId,
    },
    /// Edit one of your tools; omitted fields keep their value
    Edit {
        id: ToolId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, conflicts_with = "image_file")]
        image: Option<String>,
        #[arg(long)]
        image_file: Option<PathBuf>,
    },
    /// Delete one of your tools
    Delete {
        id: ToolId,
    },
    /// Price a rental period without booking it
    Quote {
        id: ToolId,
        /// Start, RFC 3339 or YYYY-MM-DD HH:MM (UTC)
        #[arg(long, value_parser = parse_datetime)]
        start: DateTime<Utc>,
        /// End, RFC 3339 or YYYY-MM-DD HH:MM (UTC)
        #[arg(long, value_parser = parse_datetime)]
        end: DateTime<Utc>,
    },
    /// Rent a tool
    Rent {
        id: ToolId,
        #[arg(long, value_parser = parse_datetime)]
        start: DateTime<Utc>,
        #[arg(long, value_parser = parse_datetime)]
        end: DateTime<Utc>,
    },
}

#[derive(Subcommand)]
pub enum ReservationCommands {
    /// List reservations
    List {
        /// Reservations on your tools instead of the ones you made
        #[arg(short, long)]
        received: bool,
        /// Only tools in this category
        #[arg(short, long)]
        category: Option<String>,
        /// Keep polling and redraw on changes
        #[arg(short, long)]
        watch: bool,
    },
    /// Change the status of a reservation on one of your tools
    Status {
        id: ReservationId,
        #[arg(value_parser = parse_reservation_status)]
        status: ReservationStatus,
    },
    /// Delete a reservation you made
    Delete {
        id: ReservationId,
    },
    /// Rate the tool of a finished reservation (0-5)
    Rate {
        id: ReservationId,
        rating: i64,
    },
}

#[derive(Subcommand)]
pub enum NotificationCommands {
    List {
        #[arg(short, long)]
        watch: bool,
    },
    /// Mark a notification as read
    Read {
        id: NotificationId,
    },
    Delete {
        id: NotificationId,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration and show the effective values
    Check,
}

fn parse_tool_status(value: &str) -> Result<ToolStatus, String> {
    ToolStatus::parse(value)
        .ok_or_else(|| format!("unknown status '{}': use disponível, alugada or em manutenção", value))
}

fn parse_reservation_status(value: &str) -> Result<ReservationStatus, String> {
    ReservationStatus::parse(value).ok_or_else(|| {
        format!(
            "unknown status '{}': use pendente, confirmada, cancelada or finalizada",
            value
        )
    })
}

/// Accepts RFC 3339 or a naive `YYYY-MM-DD HH:MM` taken as UTC.
fn parse_datetime(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(format!(
        "invalid date '{}': expected RFC 3339 or YYYY-MM-DD HH:MM",
        value
    ))
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn acknowledge(result: Result<Acknowledgment, MutationError>) -> Result<()> {
    match result {
        Ok(ack) => {
            println!("{}", ack.message);
            Ok(())
        }
        Err(e) => {
            debug!(error = ?e.cause, "Mutation rejected");
            Err(anyhow!(e.message))
        }
    }
}

/// Everything a command needs: config, backend client and the session.
struct Context {
    config: Config,
    client: ApiClient,
    session: Arc<SessionStore>,
}

impl Context {
    fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.api).context("Failed to create HTTP client")?;
        let client = ApiClient::new(Arc::new(transport));
        let session = SessionStore::from_config(Arc::new(client.clone()), &config.session);
        session.initialize();

        Ok(Self {
            config,
            client,
            session: Arc::new(session),
        })
    }

    fn mutations(&self) -> MutationHandler {
        MutationHandler::new(self.client.clone(), Arc::clone(&self.session))
    }

    fn poll_options(&self) -> PollOptions {
        PollOptions::from(&self.config.polling)
    }

    /// Run the route guard for `path`. `Ok(false)` means the page was
    /// skipped because the user is already signed in.
    fn enter(&self, path: &str) -> Result<bool> {
        match RouteGuard::for_marketplace(self.session.as_ref()).navigate(path) {
            Navigation::Allow => Ok(true),
            Navigation::Redirect(to) if to == LOGIN_PATH => {
                bail!("You are not signed in. Run `toolshare login <email>` first.")
            }
            Navigation::Redirect(to) => {
                let name = self.session.user().map(|u| u.name).unwrap_or_default();
                println!("Already signed in as {}. Continue with `toolshare {}`.", name, to.trim_start_matches('/'));
                Ok(false)
            }
        }
    }

    fn viewer(&self) -> Result<AuthenticatedSession> {
        Ok(self.session.require()?)
    }

    /// Poll `source` once and wait for the result.
    async fn fetch_once<S: CollectionSource>(
        &self,
        source: S,
        filter: S::Filter,
    ) -> Result<Arc<CollectionStore<S::Item>>> {
        let store = Arc::new(CollectionStore::new());
        let driver = PollDriver::new(
            source,
            Arc::clone(&store),
            &self.session,
            self.config.polling.stale_policy,
        );
        let handle = driver
            .issue(filter)
            .ok_or_else(|| anyhow!("You are not signed in"))?;
        handle.await.context("Poll task failed")?;

        if let Some(err) = store.last_error() {
            bail!("Failed to load data: {}", err);
        }
        Ok(store)
    }

    /// Redraw `render` whenever one of `changes` fires, until Ctrl+C or the
    /// session ends. Identical output is not printed twice.
    async fn watch<F, Fut>(&self, mut changes: Vec<watch::Receiver<u64>>, mut render: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let mut session = self.session.subscribe();
        let mut last: Option<String> = None;
        println!("Watching for changes. Press Ctrl+C to stop.");

        loop {
            tokio::select! {
                (changed, _, _) = select_all(changes.iter_mut().map(|rx| Box::pin(rx.changed()))) => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(output) = render().await {
                        if last.as_deref() != Some(output.as_str()) {
                            println!();
                            print!("{}", output);
                            last = Some(output);
                        }
                    }
                }
                changed = session.changed() => {
                    if changed.is_err()
                        || session.borrow_and_update().status() != SessionStatus::Authenticated
                    {
                        println!("Session ended. Run `toolshare login <email>` to sign in again.");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        Ok(())
    }

    async fn resolve_image(&self, url: Option<String>, file: Option<PathBuf>) -> Result<String> {
        let mut image = url.map(PendingImage::with_url).unwrap_or_default();
        if let Some(path) = file {
            let uploader = ImgbbUploader::new(
                &self.config.image_host,
                Duration::from_secs(self.config.api.timeout_secs),
            )?;
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());

            println!("Uploading {}...", path.display());
            let url = image
                .upload(&uploader, &file_name, Bytes::from(content))
                .await?;
            println!("Uploaded: {}", url);
        }
        Ok(image.value())
    }

    /// Release the session; pending polls hold only weak references.
    fn shutdown(self) {
        match Arc::try_unwrap(self.session) {
            Ok(session) => session.dispose(),
            Err(_) => debug!("Session still shared at exit"),
        }
    }
}

pub async fn run_command(cli: Cli, config: Config) -> Result<()> {
    if let Commands::Config {
        command: ConfigCommands::Check,
    } = &cli.command
    {
        return cmd_config_check(&cli.config, &config);
    }

    config.validate()?;
    let ctx = Context::new(config)?;
    let result = dispatch(&ctx, cli.command).await;
    ctx.shutdown();
    result
}

async fn dispatch(ctx: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email, password } => cmd_login(ctx, email, password).await,
        Commands::Logout => cmd_logout(ctx),
        Commands::Register {
            name,
            email,
            password,
            phone,
            cpf,
            address,
            latitude,
            longitude,
            image,
            image_file,
        } => {
            if !ctx.enter(REGISTER_PATH)? {
                return Ok(());
            }
            let password = match password {
                Some(p) => p,
                None => prompt("Password")?,
            };
            let image = ctx.resolve_image(image, image_file).await?;
            let user = NewUser {
                name,
                email,
                password,
                phone,
                cpf,
                address,
                latitude: Some(latitude),
                longitude: Some(longitude),
                image,
            };
            acknowledge(ctx.mutations().register(&user).await)?;
            println!("You can now run `toolshare login {}`.", user.email);
            Ok(())
        }
        Commands::Whoami => cmd_whoami(ctx),
        Commands::Dashboard { watch } => cmd_dashboard(ctx, watch).await,
        Commands::Tools { command } => cmd_tools(ctx, command).await,
        Commands::Reservations { command } => cmd_reservations(ctx, command).await,
        Commands::Notifications { command } => cmd_notifications(ctx, command).await,
        Commands::Upload { file } => {
            let uploader = ImgbbUploader::new(
                &ctx.config.image_host,
                Duration::from_secs(ctx.config.api.timeout_secs),
            )?;
            let url = upload::upload_file(&uploader, &file).await?;
            println!("{}", url);
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

async fn cmd_login(ctx: &Context, email: String, password: Option<String>) -> Result<()> {
    if !ctx.enter(LOGIN_PATH)? {
        return Ok(());
    }
    let password = match password {
        Some(p) => p,
        None => prompt("Password")?,
    };

    let user = ctx
        .session
        .sign_in(Credentials::new(email, password))
        .await
        .map_err(|e| anyhow!(e.user_message("Login failed")))?;

    println!("Signed in as {} ({})", user.name, user.email);
    if ctx.config.session.secret.is_none() {
        println!("No session secret configured; this session will not be remembered.");
    }
    Ok(())
}

fn cmd_logout(ctx: &Context) -> Result<()> {
    if ctx.session.status() == SessionStatus::Authenticated {
        ctx.session.sign_out();
        println!("Signed out");
    } else {
        println!("Not signed in");
    }
    Ok(())
}

fn cmd_whoami(ctx: &Context) -> Result<()> {
    match ctx.session.user() {
        Some(user) => {
            println!("ID:       {}", user.id);
            println!("Name:     {}", user.name);
            println!("Email:    {}", user.email);
            if let Some(phone) = &user.phone {
                println!("Phone:    {}", phone);
            }
        }
        None => println!("Not signed in ({})", ctx.session.status()),
    }
    Ok(())
}

async fn cmd_dashboard(ctx: &Context, watch: bool) -> Result<()> {
    ctx.enter(DASHBOARD_PATH)?;
    let viewer = ctx.viewer()?;
    let page = |tools: &[crate::models::Tool], notifications: &[crate::models::Notification]| {
        render::dashboard(
            &viewer.user.name,
            &Dashboard::build(tools, viewer.user.id),
            views::unread_count(notifications),
        )
        .to_string()
    };

    if !watch {
        let tools = ctx.fetch_once(ToolsSource::new(ctx.client.clone()), ()).await?;
        let notifications = ctx
            .fetch_once(NotificationsSource::new(ctx.client.clone()), ())
            .await?;
        print!("{}", page(&tools.items(), &notifications.items()));
        return Ok(());
    }

    let tools = Poller::mount(
        ToolsSource::new(ctx.client.clone()),
        &ctx.session,
        (),
        ctx.poll_options(),
    );
    let notifications = Poller::mount(
        NotificationsSource::new(ctx.client.clone()),
        &ctx.session,
        (),
        ctx.poll_options(),
    );
    let (tool_store, notification_store) = (tools.store(), notifications.store());

    ctx.watch(
        vec![tool_store.subscribe(), notification_store.subscribe()],
        || {
            let tools = tool_store.snapshot();
            let notifications = notification_store.snapshot();
            let output = (!tools.loading).then(|| page(&tools.items, &notifications.items));
            async move { output }
        },
    )
    .await?;

    tools.unmount().await;
    notifications.unmount().await;
    Ok(())
}

async fn cmd_tools(ctx: &Context, command: ToolCommands) -> Result<()> {
    match command {
        ToolCommands::Mine => {
            ctx.enter(MY_TOOLS_PATH)?;
            let viewer = ctx.viewer()?;
            let tools = ctx
                .fetch_once(ToolsSource::new(ctx.client.clone()), ())
                .await?
                .items();
            let mine = views::owned_listings(&tools, viewer.user.id);
            print!("{}", render::tool_table("My tools", &mine));
            Ok(())
        }
        ToolCommands::Add {
            name,
            description,
            price,
            category,
            status,
            image,
            image_file,
        } => {
            ctx.enter(MY_TOOLS_PATH)?;
            let image = ctx.resolve_image(image, image_file).await?;
            let form = ToolForm {
                name,
                description,
                price,
                category,
                status,
                image,
            };
            acknowledge(ctx.mutations().create_tool(form, None).await)
        }
        ToolCommands::Show { id } => {
            ctx.enter(&tool_path(id))?;
            let viewer = ctx.viewer()?;
            let detail = fetch_tool_detail(&ctx.client, &viewer.token, id)
                .await
                .map_err(|e| anyhow!(e.user_message("Failed to load tool")))?;
            print!("{}", render::tool_detail(&detail));
            Ok(())
        }
        ToolCommands::Edit {
            id,
            name,
            description,
            price,
            category,
            image,
            image_file,
        } => {
            ctx.enter(&tool_path(id))?;
            let viewer = ctx.viewer()?;
            let current = ctx
                .client
                .get_tool(&viewer.token, id)
                .await
                .map_err(|e| anyhow!(e.user_message("Failed to load tool")))?;
            if !current.is_owned_by(viewer.user.id) {
                bail!("Only the owner can edit this tool");
            }

            let image = match (image, image_file) {
                (None, None) => current.image.clone().unwrap_or_default(),
                (url, file) => ctx.resolve_image(url, file).await?,
            };
            let update = ToolUpdate {
                name: name.unwrap_or(current.name),
                description: description.unwrap_or(current.description),
                price: price.unwrap_or(current.price),
                category: category.unwrap_or(current.category),
                image,
            };
            acknowledge(ctx.mutations().update_tool(id, update, None).await)
        }
        ToolCommands::Delete { id } => {
            ctx.enter(&tool_path(id))?;
            acknowledge(ctx.mutations().delete_tool(id, None).await)
        }
        ToolCommands::Quote { id, start, end } => {
            ctx.enter(&tool_path(id))?;
            let viewer = ctx.viewer()?;
            let tool = ctx
                .client
                .get_tool(&viewer.token, id)
                .await
                .map_err(|e| anyhow!(e.user_message("Failed to load tool")))?;
            let quote = views::quote(tool.price, start, end).map_err(|e| anyhow!(e.to_string()))?;
            println!(
                "{}: {:.2}h at {} = {}",
                tool.name,
                quote.hours,
                views::format_price(tool.price),
                views::format_total(quote.total)
            );
            Ok(())
        }
        ToolCommands::Rent { id, start, end } => {
            ctx.enter(&tool_path(id))?;
            let viewer = ctx.viewer()?;
            let tool = ctx
                .client
                .get_tool(&viewer.token, id)
                .await
                .map_err(|e| anyhow!(e.user_message("Failed to load tool")))?;
            if let Ok(quote) = views::quote(tool.price, start, end) {
                println!("Total: {}", views::format_total(quote.total));
            }
            acknowledge(
                ctx.mutations()
                    .create_reservation(&tool, start, end, None)
                    .await,
            )
        }
    }
}

async fn find_reservation(
    ctx: &Context,
    tab: ReservationTab,
    id: ReservationId,
) -> Result<(Reservation, Arc<CollectionStore<Reservation>>)> {
    let store = ctx
        .fetch_once(ReservationsSource::new(ctx.client.clone()), tab)
        .await?;
    let reservation = store
        .items()
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| anyhow!("Reservation {} not found among reservations {}", id, tab))?;
    Ok((reservation, store))
}

async fn cmd_reservations(ctx: &Context, command: ReservationCommands) -> Result<()> {
    ctx.enter(MY_RESERVATIONS_PATH)?;
    let viewer = ctx.viewer()?;

    match command {
        ReservationCommands::List {
            received,
            category,
            watch,
        } => {
            let tab = if received {
                ReservationTab::Received
            } else {
                ReservationTab::Made
            };
            let page = |reservations: Vec<Reservation>| {
                let client = ctx.client.clone();
                let token = viewer.token.clone();
                let category = category.clone();
                let viewer_id = viewer.user.id;
                async move {
                    let users = fetch_user_directory(&client, &token, &reservations).await;
                    let shown = views::filter_by_category(&reservations, category.as_deref());
                    render::reservation_table(&shown, tab, viewer_id, &users).to_string()
                }
            };

            if !watch {
                let store = ctx
                    .fetch_once(ReservationsSource::new(ctx.client.clone()), tab)
                    .await?;
                print!("{}", page(store.items()).await);
                return Ok(());
            }

            let poller = Poller::mount(
                ReservationsSource::new(ctx.client.clone()),
                &ctx.session,
                tab,
                ctx.poll_options(),
            );
            let store = poller.store();
            ctx.watch(vec![store.subscribe()], || {
                let snapshot = store.snapshot();
                let render = (!snapshot.loading).then(|| page(snapshot.items));
                async move {
                    match render {
                        Some(render) => Some(render.await),
                        None => None,
                    }
                }
            })
            .await?;
            poller.unmount().await;
            Ok(())
        }
        ReservationCommands::Status { id, status } => {
            let (reservation, store) = find_reservation(ctx, ReservationTab::Received, id).await?;
            acknowledge(
                ctx.mutations()
                    .change_reservation_status(&reservation, status, Some(&store))
                    .await,
            )
        }
        ReservationCommands::Delete { id } => {
            let (reservation, store) = find_reservation(ctx, ReservationTab::Made, id).await?;
            acknowledge(
                ctx.mutations()
                    .delete_reservation(&reservation, Some(&store))
                    .await,
            )
        }
        ReservationCommands::Rate { id, rating } => {
            let (reservation, _) = find_reservation(ctx, ReservationTab::Made, id).await?;
            acknowledge(ctx.mutations().submit_rating(&reservation, rating).await)
        }
    }
}

async fn cmd_notifications(ctx: &Context, command: NotificationCommands) -> Result<()> {
    ctx.enter(DASHBOARD_PATH)?;

    match command {
        NotificationCommands::List { watch } => {
            if !watch {
                let store = ctx
                    .fetch_once(NotificationsSource::new(ctx.client.clone()), ())
                    .await?;
                print!("{}", render::notification_list(&store.items()));
                return Ok(());
            }

            let poller = Poller::mount(
                NotificationsSource::new(ctx.client.clone()),
                &ctx.session,
                (),
                ctx.poll_options(),
            );
            let store = poller.store();
            ctx.watch(vec![store.subscribe()], || {
                let snapshot = store.snapshot();
                let output = (!snapshot.loading)
                    .then(|| render::notification_list(&snapshot.items).to_string());
                async move { output }
            })
            .await?;
            poller.unmount().await;
            Ok(())
        }
        NotificationCommands::Read { id } => {
            acknowledge(ctx.mutations().mark_notification_read(id, None).await)
        }
        NotificationCommands::Delete { id } => {
            acknowledge(ctx.mutations().delete_notification(id, None).await)
        }
    }
}

fn cmd_config_check(path: &std::path::Path, config: &Config) -> Result<()> {
    println!("Checking configuration file: {}", path.display());
    if !path.exists() {
        println!("[INFO] File not found, using defaults and environment");
    }
    println!();

    if let Err(e) = config.validate() {
        println!("[ERROR] {}", e);
        return Err(e);
    }
    println!("[OK] Configuration is valid!");

    let warnings = config.warnings();
    if !warnings.is_empty() {
        println!();
        for warning in &warnings {
            println!("[WARN] {}", warning);
        }
    }

    let set = |value: &Option<String>| if value.is_some() { "set" } else { "not set" };

    println!();
    println!("=== Configuration Summary ===");
    println!();
    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Timeout: {}s", config.api.timeout_secs);
    println!();
    println!("Image host:");
    println!("  Upload URL: {}", config.image_host.upload_url);
    println!("  API key: {}", set(&config.image_host.api_key));
    println!();
    println!("Maps:");
    println!("  API key: {}", set(&config.maps.api_key));
    println!();
    println!("Session:");
    println!("  Secret: {}", set(&config.session.secret));
    println!("  Store path: {}", config.session.store_path.display());
    println!("  Max age: {}h", config.session.max_age_hours);
    println!(
        "  Sign out on 401/403: {}",
        config.session.logout_on_unauthorized
    );
    println!();
    println!("Polling:");
    println!("  Interval: {}ms", config.polling.interval_ms);
    println!("  Stale responses: {:?}", config.polling.stale_policy);
    println!();
    println!("Logging:");
    println!("  Level: {}", config.logging.level);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rent_command() {
        let cli = Cli::try_parse_from([
            "toolshare",
            "tools",
            "rent",
            "7",
            "--start",
            "2024-06-01 08:00",
            "--end",
            "2024-06-01T12:00:00-03:00",
        ])
        .unwrap();

        match cli.command {
            Commands::Tools {
                command: ToolCommands::Rent { id, start, end },
            } => {
                assert_eq!(id, ToolId(7));
                assert_eq!(start.to_rfc3339(), "2024-06-01T08:00:00+00:00");
                assert_eq!(end.to_rfc3339(), "2024-06-01T15:00:00+00:00");
            }
            _ => panic!("expected tools rent"),
        }
    }

    #[test]
    fn test_parse_statuses() {
        let cli = Cli::try_parse_from(["toolshare", "reservations", "status", "3", "confirmada"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Reservations {
                command: ReservationCommands::Status {
                    status: ReservationStatus::Confirmada,
                    ..
                }
            }
        ));

        assert!(Cli::try_parse_from(["toolshare", "reservations", "status", "3", "aprovada"]).is_err());
        assert_eq!(parse_tool_status("em manutencao"), Ok(ToolStatus::Maintenance));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_running() {
        let cli = Cli::try_parse_from(["toolshare", "whoami"]).unwrap();
        let mut config = Config::default();
        config.polling.interval_ms = 0;

        let err = run_command(cli, config).await.unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        assert!(parse_datetime("amanhã").is_err());
        assert!(parse_datetime("2024-06-01").is_err());
    }

    #[test]
    fn test_register_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "toolshare",
            "register",
            "--name",
            "Carla Souza",
            "--email",
            "carla@example.com",
            "--phone",
            "11988887777",
            "--cpf",
            "123.456.789-00",
            "--address",
            "Rua das Flores, 10",
            "--latitude",
            "-23.55",
            "--longitude",
            "-46.63",
            "--image",
            "https://i.ibb.co/x/carla.png",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Register { password: None, .. }));
    }
}
