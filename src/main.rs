use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use paygate::app::Config;
use paygate::handlers::{health_handler, invoices, metrics, notify, payments};
use paygate::models::PaymentRequest;
use paygate::{GatewayConnectors, PaymentService, ProviderRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "paygate", version, about = "Payment gateway service")]
struct Cli {
    /// TOML file listing the configured providers
    #[arg(long, env = "PAYGATE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Resolve the current state of one order and print it as JSON
    Status { provider: String, order_id: String },
    /// Start a payment and print the gateway response as JSON
    Pay {
        provider: String,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, default_value = "")]
        product: String,
        #[arg(long, default_value = "")]
        return_url: String,
        /// Defaults to a generated name
        #[arg(long)]
        payment_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    let registry = ProviderRegistry::from_config(&config, &GatewayConnectors::default())
        .context("building payment providers")?;
    let service = Arc::new(PaymentService::new(Arc::new(registry)));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(service, config.server_port).await,
        Command::Status { provider, order_id } => {
            let result = service.notify(&provider, &[], &order_id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Pay {
            provider,
            price,
            currency,
            product,
            return_url,
            payment_name,
        } => {
            let request = PaymentRequest {
                provider_name: provider.clone(),
                product_name: product.clone(),
                product_display_name: product,
                payment_name: payment_name.unwrap_or_else(|| format!("payment_{}", uuid::Uuid::new_v4().simple())),
                price,
                currency,
                return_url,
                ..Default::default()
            };
            let response = service.pay(&provider, &request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

async fn serve(service: Arc<PaymentService>, port: u16) -> anyhow::Result<()> {
    info!("Starting paygate with providers: {:?}", service.provider_names());

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/payments/:provider", post(payments::create_payment))
        .route("/payments/:provider/:order_id", get(payments::payment_status))
        .route("/notify/:provider/:order_id", post(notify::handle_notification))
        .route("/invoices/:provider", post(invoices::create_invoice))
        .route("/metrics", get(metrics::get_metrics))
        .with_state(service);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
