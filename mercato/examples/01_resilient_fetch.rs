use std::time::Duration;

use mercato::{
    ConfigurationService, FetchRequest, Mercato, MercatoError, ProviderId, RequestPriority,
    RequestType,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Quote {
    symbol: String,
    price: f64,
    source: String,
}

// Stand-in for a real provider SDK call; the primary provider is flaky.
async fn fetch_quote(provider: ProviderId, symbol: &str) -> Result<Quote, MercatoError> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if provider.as_str() == "alpaca" {
        return Err(MercatoError::provider(provider.as_str(), "503 Service Unavailable"));
    }
    Ok(Quote {
        symbol: symbol.to_string(),
        price: 187.42,
        source: provider.to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mercato=debug".into()),
        )
        .init();

    let config = ConfigurationService::default();
    let resolved = config.initialize().await;
    for warning in config.warnings() {
        println!("config warning: {warning}");
    }
    println!(
        "environment={} base_url={} layers={:?}",
        resolved.environment, resolved.api.base_url, resolved.layers
    );

    let mercato = Mercato::builder().config(resolved).build()?;
    mercato
        .limits()
        .set_symbol_priority("SPY", RequestPriority::Critical);

    for symbol in ["AAPL", "AAPL", "SPY"] {
        let req = FetchRequest::for_symbol(RequestType::Quote, symbol).ttl(Duration::from_secs(30));
        let quote: Quote = mercato
            .fetch(&req, |provider| fetch_quote(provider, symbol))
            .await?;
        println!("{} {:.2} via {}", quote.symbol, quote.price, quote.source);
    }

    let stats = mercato.cache().stats();
    println!("cache hits={} misses={}", stats.hits, stats.misses);
    for usage in mercato.limits().usage_snapshot() {
        println!("{} health={}", usage.provider, usage.health_score);
    }
    Ok(())
}
