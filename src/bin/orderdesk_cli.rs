use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use orderdesk::{
    client::ApiClient,
    config::{self, AppConfig},
    models::{AuthenticatedUser, Order, OrderAction, OrderStatus, RefundReason, User},
    order_detail::{
        refund_dialogs::RefundRequestForm,
        stepper::{StageState, StepperView},
        NoticeLevel, OrderDetailController, OrderView,
    },
    services::{
        auth::HttpAuthApi,
        orders::{HttpOrderApi, OrderApi, OrderListQuery, OrderPage},
    },
    session::Session,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Auth(command) => handle_auth_command(&context, command, cli.json).await?,
        Commands::Orders(command) => {
            handle_orders_command(&context, command, cli.json, cli.yes).await?
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "orderdesk", about = "Order lifecycle and refund desk", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[arg(
        long,
        short = 'y',
        global = true,
        action = ArgAction::SetTrue,
        help = "Skip confirmation prompts"
    )]
    yes: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Auth(AuthCommands),
    #[command(subcommand)]
    Orders(OrdersCommands),
}

#[derive(Subcommand)]
enum AuthCommands {
    Login(AuthLoginArgs),
    Register(AuthRegisterArgs),
    Whoami,
    Logout,
}

#[derive(Args)]
struct AuthLoginArgs {
    #[arg(long, help = "Email address for the account")]
    email: String,
    #[arg(long, help = "Password for the account")]
    password: String,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Persist the issued token to disk for reuse"
    )]
    save: bool,
}

#[derive(Args)]
struct AuthRegisterArgs {
    #[arg(long, help = "Display name")]
    name: String,
    #[arg(long, help = "Email address for the new account")]
    email: String,
    #[arg(long, help = "Password (at least 6 characters)")]
    password: String,
    #[arg(long, action = ArgAction::SetTrue, help = "Persist the issued token to disk")]
    save: bool,
}

#[derive(Subcommand)]
enum OrdersCommands {
    Get(OrderIdArgs),
    List(ListOrdersArgs),
    Mine,
    Actions(OrderIdArgs),
    Confirm(OrderIdArgs),
    Ship(OrderIdArgs),
    Complete(OrderIdArgs),
    Cancel(OrderIdArgs),
    RequestRefund(RequestRefundArgs),
    ApproveRefund(ApproveRefundArgs),
    RejectRefund(RejectRefundArgs),
}

#[derive(Args)]
struct OrderIdArgs {
    #[arg(help = "Order identifier")]
    id: String,
}

#[derive(Args)]
struct ListOrdersArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    limit: u32,
    #[arg(long, help = "Filter by status (pending, processing, completed, ...)")]
    status: Option<String>,
}

#[derive(Args)]
struct RequestRefundArgs {
    #[arg(help = "Order identifier")]
    id: String,
    #[arg(
        long,
        help = "Reason code: damaged, wrong_item, size_issue, quality_issue or other"
    )]
    reason: String,
    #[arg(long, help = "Optional details for the shop")]
    notes: Option<String>,
}

#[derive(Args)]
struct ApproveRefundArgs {
    #[arg(help = "Order identifier")]
    id: String,
    #[arg(long, help = "Optional note recorded with the approval")]
    notes: Option<String>,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Do not create a warehouse stock-in voucher"
    )]
    no_import_voucher: bool,
}

#[derive(Args)]
struct RejectRefundArgs {
    #[arg(help = "Order identifier")]
    id: String,
    #[arg(long, help = "Reason for the rejection (required)")]
    notes: String,
}

#[derive(Serialize, Deserialize)]
struct StoredSession {
    api_base_url: String,
    token: String,
    user: User,
    saved_at: DateTime<Utc>,
}

struct CliContext {
    config: AppConfig,
    session: Arc<Session>,
    orders: Arc<HttpOrderApi>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let client = Arc::new(ApiClient::from_config(&config).context("failed to build HTTP client")?);
        let session = Arc::new(Session::new(Arc::new(HttpAuthApi::new(client.clone()))));
        let orders = Arc::new(HttpOrderApi::new(client.clone()));

        if let Some((path, stored)) = read_session(&config)? {
            if stored.api_base_url == config.api_base_url {
                debug!(path = %path.display(), "restoring saved session");
                session
                    .restore(AuthenticatedUser {
                        user: stored.user,
                        token: stored.token,
                    })
                    .await;
            } else {
                debug!(
                    saved = %stored.api_base_url,
                    configured = %config.api_base_url,
                    "ignoring session saved for another backend"
                );
            }
        }

        Ok(Self {
            config,
            session,
            orders,
        })
    }

    fn controller(&self) -> OrderDetailController {
        OrderDetailController::new(
            self.orders.clone(),
            self.session.clone(),
            self.config.default_refund_method.clone(),
        )
    }

    fn require_login(&self) -> Result<()> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(anyhow!("not signed in; run `orderdesk auth login` first"))
        }
    }
}

async fn handle_auth_command(context: &CliContext, command: AuthCommands, json: bool) -> Result<()> {
    match command {
        AuthCommands::Login(args) => {
            let user = context
                .session
                .login(&args.email, &args.password)
                .await
                .context("failed to sign in")?;
            let saved = if args.save { persist_session(context)? } else { None };
            render_signed_in(&user, saved, json)
        }
        AuthCommands::Register(args) => {
            let user = context
                .session
                .register(&args.name, &args.email, &args.password)
                .await
                .context("failed to register account")?;
            let saved = if args.save { persist_session(context)? } else { None };
            render_signed_in(&user, saved, json)
        }
        AuthCommands::Whoami => {
            context.require_login()?;
            let user = match context.session.refresh_profile().await {
                Ok(user) => user,
                Err(e) => {
                    if !context.session.is_authenticated() {
                        if let Some(path) = context.config.session_file_path() {
                            clear_session_file(&path)?;
                        }
                    }
                    return Err(anyhow!(e).context("failed to fetch profile"));
                }
            };
            if json {
                print_json(&user)
            } else {
                println!("{} <{}> • {} • id {}", user.name, user.email, user.role.label(), user.id);
                Ok(())
            }
        }
        AuthCommands::Logout => {
            context.session.logout().await;
            if let Some(path) = context.config.session_file_path() {
                clear_session_file(&path)?;
            }
            if !json {
                println!("Signed out");
            }
            Ok(())
        }
    }
}

async fn handle_orders_command(
    context: &CliContext,
    command: OrdersCommands,
    json: bool,
    assume_yes: bool,
) -> Result<()> {
    context.require_login()?;

    match command {
        OrdersCommands::Get(args) => {
            let controller = load(context, &args.id).await?;
            show_detail(&controller, json)
        }
        OrdersCommands::List(args) => {
            let status = args
                .status
                .as_deref()
                .map(str::parse::<OrderStatus>)
                .transpose()?;
            let query = OrderListQuery {
                page: args.page,
                limit: args.limit,
                status,
            };
            let page = context
                .orders
                .list_orders(&query)
                .await
                .context("failed to list orders")?;
            if json {
                print_json(&page)
            } else {
                render_page(&page);
                Ok(())
            }
        }
        OrdersCommands::Mine => {
            let orders = context
                .orders
                .list_my_orders()
                .await
                .context("failed to list your orders")?;
            if json {
                print_json(&orders)
            } else {
                if orders.is_empty() {
                    println!("No orders yet");
                }
                orders.iter().for_each(render_order_row);
                Ok(())
            }
        }
        OrdersCommands::Actions(args) => {
            let controller = load(context, &args.id).await?;
            let actions = controller.available_actions();
            if json {
                print_json(&actions)
            } else {
                if actions.is_empty() {
                    match controller.status() {
                        Some(status) if status.is_terminal() => {
                            println!("Order is {status}; no further actions")
                        }
                        _ => println!("No actions available"),
                    }
                }
                for action in actions {
                    println!("- {} ({})", action.label(), action);
                }
                Ok(())
            }
        }
        OrdersCommands::Confirm(args) => {
            run_stepper_action(context, &args.id, OrderAction::Confirm, json, assume_yes).await
        }
        OrdersCommands::Ship(args) => {
            run_stepper_action(context, &args.id, OrderAction::Ship, json, assume_yes).await
        }
        OrdersCommands::Complete(args) => {
            run_stepper_action(context, &args.id, OrderAction::Complete, json, assume_yes).await
        }
        OrdersCommands::Cancel(args) => {
            run_stepper_action(context, &args.id, OrderAction::Cancel, json, assume_yes).await
        }
        OrdersCommands::RequestRefund(args) => {
            let reason: RefundReason = args.reason.parse().with_context(|| {
                let codes: Vec<&str> = RefundRequestForm::reason_options()
                    .iter()
                    .map(|(reason, _)| reason.code())
                    .collect();
                format!("expected one of: {}", codes.join(", "))
            })?;
            let mut controller = load(context, &args.id).await?;
            open_dialog(&mut controller, OrderAction::RequestRefund)?;
            if !confirmed(OrderAction::RequestRefund, assume_yes)? {
                return Ok(());
            }
            {
                let form = controller.refund_request_dialog().form_mut();
                form.reason = Some(reason);
                form.notes = args.notes.unwrap_or_default();
            }
            let result = controller.submit_refund_request().await;
            finish(&mut controller, result, json)
        }
        OrdersCommands::ApproveRefund(args) => {
            let mut controller = load(context, &args.id).await?;
            open_dialog(&mut controller, OrderAction::ApproveRefund)?;
            if !confirmed(OrderAction::ApproveRefund, assume_yes)? {
                return Ok(());
            }
            {
                let form = controller.approval_dialog().form_mut();
                form.notes = args.notes.unwrap_or_default();
                form.create_import_voucher = !args.no_import_voucher;
            }
            let result = controller.submit_refund_approval().await;
            finish(&mut controller, result, json)
        }
        OrdersCommands::RejectRefund(args) => {
            let mut controller = load(context, &args.id).await?;
            open_dialog(&mut controller, OrderAction::RejectRefund)?;
            if !confirmed(OrderAction::RejectRefund, assume_yes)? {
                return Ok(());
            }
            controller.rejection_dialog().form_mut().notes = args.notes;
            let result = controller.submit_refund_rejection().await;
            finish(&mut controller, result, json)
        }
    }
}

async fn load(context: &CliContext, id: &str) -> Result<OrderDetailController> {
    let mut controller = context.controller();
    let result = controller.load_order(id).await;
    print_notices(&mut controller);
    if let OrderView::Failed(failure) = controller.view() {
        let cause = result.err().map(|e| e.to_string()).unwrap_or_default();
        return Err(anyhow!("{} ({})", failure.message, cause))
            .with_context(|| format!("back to list: {}", failure.back_to_list));
    }
    result.with_context(|| format!("failed to load order {id}"))?;
    Ok(controller)
}

fn open_dialog(controller: &mut OrderDetailController, action: OrderAction) -> Result<()> {
    if controller.open_refund_dialog(action) {
        Ok(())
    } else {
        Err(anyhow!(
            "\"{}\" is not available for this order (status {})",
            action.label(),
            controller
                .status()
                .map(|s| s.label())
                .unwrap_or("unknown")
        ))
    }
}

async fn run_stepper_action(
    context: &CliContext,
    id: &str,
    action: OrderAction,
    json: bool,
    assume_yes: bool,
) -> Result<()> {
    let mut controller = load(context, id).await?;
    if !controller.request_action(action) {
        return Err(anyhow!(
            "\"{}\" is not available for this order (status {})",
            action.label(),
            controller
                .status()
                .map(|s| s.label())
                .unwrap_or("unknown")
        ));
    }

    let prompt = controller
        .stepper_view()
        .and_then(|view| view.prompt)
        .unwrap_or_else(|| action.confirmation_prompt());
    if !assume_yes && !prompt_yes_no(&prompt)? {
        controller.dismiss_action();
        println!("Aborted");
        return Ok(());
    }

    let before = controller.status();
    let result = controller.confirm_action().await;
    if result.is_ok() && controller.status() == before {
        debug!(%action, "action confirmed without a status change");
        if !json {
            println!("\"{}\" confirmed; status unchanged", action.label());
        }
    }
    finish(&mut controller, result, json)
}

fn finish(
    controller: &mut OrderDetailController,
    result: std::result::Result<(), orderdesk::ServiceError>,
    json: bool,
) -> Result<()> {
    print_notices(controller);
    result.context("operation failed")?;
    show_detail(controller, json)
}

/// Two-step commit for refund dialogs.
fn confirmed(action: OrderAction, assume_yes: bool) -> Result<bool> {
    if assume_yes || prompt_yes_no(&action.confirmation_prompt())? {
        Ok(true)
    } else {
        println!("Aborted");
        Ok(false)
    }
}

fn prompt_yes_no(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "c" | "có"))
}

fn print_notices(controller: &mut OrderDetailController) {
    for notice in controller.take_notices() {
        match notice.level {
            NoticeLevel::Success => eprintln!("✔ {notice}"),
            NoticeLevel::Error => eprintln!("✖ {notice}"),
        }
    }
}

#[derive(Serialize)]
struct DetailOutput<'a> {
    order: &'a Order,
    actions: Vec<OrderAction>,
    stepper: Option<StepperView>,
}

fn show_detail(controller: &OrderDetailController, json: bool) -> Result<()> {
    let Some(order) = controller.order() else {
        return Err(anyhow!("order is not loaded"));
    };
    if json {
        return print_json(&DetailOutput {
            order,
            actions: controller.available_actions(),
            stepper: controller.stepper_view(),
        });
    }

    render_order(order);
    if let Some(view) = controller.stepper_view() {
        render_stepper(&view);
    }
    let actions = controller.available_actions();
    if !actions.is_empty() {
        let labels: Vec<&str> = actions.iter().map(OrderAction::label).collect();
        println!("Actions: {}", labels.join(" | "));
    }
    Ok(())
}

fn render_signed_in(user: &User, saved: Option<String>, json: bool) -> Result<()> {
    if json {
        return print_json(user);
    }
    println!("Signed in as {} <{}> ({})", user.name, user.email, user.role.label());
    if let Some(path) = saved {
        println!("Session saved to: {}", path);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_order_row(order: &Order) {
    println!(
        "- Order {} • {} • {} • total {} • {}",
        order.id,
        order.customer.email,
        order.status.label(),
        order.total,
        order.payment_status.label()
    );
}

fn render_page(page: &OrderPage) {
    page.orders.iter().for_each(render_order_row);
    println!(
        "Page {}/{} ({} orders)",
        page.page, page.pages, page.total
    );
}

fn render_order(order: &Order) {
    println!("Order {} • {}", order.id, order.status.label());
    println!(
        "  Customer: {} <{}>",
        order.customer.name.as_deref().unwrap_or("-"),
        order.customer.email
    );
    println!(
        "  Ship to: {}, {}",
        order.shipping_address.address, order.shipping_address.city
    );
    for item in &order.items {
        println!(
            "  • {} x {} @ {} (total {})",
            item.quantity, item.name, item.unit_price, item.line_total
        );
    }
    println!(
        "  Subtotal {} • shipping {} • tax {} • total {}",
        order.subtotal, order.shipping, order.tax, order.total
    );
    println!(
        "  Payment: {} ({})",
        order.payment_status.label(),
        order.payment_method
    );
    if let Some(refund) = &order.refund_info {
        println!("  Refund reason: {}", refund.reason_text());
        if let Some(notes) = &refund.notes {
            println!("  Customer notes: {}", notes);
        }
        if let Some(amount) = refund.refund_amount {
            println!(
                "  Refunded {} via {}",
                amount,
                refund.refund_method.as_deref().unwrap_or("-")
            );
        }
        if let Some(notes) = &refund.admin_notes {
            println!("  Admin notes: {}", notes);
        }
        if let Some(voucher) = &refund.import_voucher_id {
            println!("  Stock-in voucher: {}", voucher);
        }
    }
}

fn render_stepper(view: &StepperView) {
    let track: Vec<String> = view
        .stages
        .iter()
        .map(|s| {
            let mark = match s.state {
                StageState::Done => "✔",
                StageState::Current => "▶",
                StageState::Upcoming => "○",
            };
            format!("{mark} {}", s.stage.label())
        })
        .collect();
    println!("  {}", track.join(" → "));
    if let Some(branch) = view.branch {
        println!("  ({:?})", branch);
    }
}

fn persist_session(context: &CliContext) -> Result<Option<String>> {
    let Some(authenticated) = context.session.snapshot() else {
        return Ok(None);
    };

    if let Some(path) = context.config.session_file_path() {
        let session = StoredSession {
            api_base_url: context.config.api_base_url.clone(),
            token: authenticated.token,
            user: authenticated.user,
            saved_at: Utc::now(),
        };
        save_session(&path, &session)?;
        Ok(Some(path.display().to_string()))
    } else {
        eprintln!("Skipping session persistence: no suitable directory found.");
        Ok(None)
    }
}

fn save_session(path: &Path, session: &StoredSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating directory {}", parent.display()))?;
    }

    let payload = serde_json::to_vec_pretty(session)?;
    fs::write(path, payload).with_context(|| format!("failed writing {}", path.display()))?;
    Ok(())
}

fn read_session(config: &AppConfig) -> Result<Option<(PathBuf, StoredSession)>> {
    let path = match config.session_file_path() {
        Some(path) => path,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    let data = fs::read_to_string(&path)
        .with_context(|| format!("failed to read session file {}", path.display()))?;
    let session: StoredSession = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse session file {}", path.display()))?;
    Ok(Some((path, session)))
}

fn clear_session_file(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}
