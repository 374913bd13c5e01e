use std::sync::Arc;

use anyhow::Context;

use onboarding_intake::config::ClientConfig;
use onboarding_intake::onboarding::{HttpOnboardingService, OnboardingEngine, SectionView};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ClientConfig::from_env().context("reading ONBOARDING_* configuration")?;

    eprintln!("Onboarding intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Service: {}", config.api_url);
    eprintln!("   Wizard: {} ({} sections)", config.registry.name(), config.registry.len());

    let service = HttpOnboardingService::new(&config).context("building HTTP client")?;
    let engine = OnboardingEngine::from_config(Arc::new(service), &config);

    let record = engine
        .load()
        .await
        .context("loading onboarding record")?;

    eprintln!();
    for view in engine.section_views().await {
        print_section(&view);
    }

    let landing = engine
        .active_section()
        .await
        .unwrap_or_else(|| config.registry.first());
    eprintln!();
    eprintln!("Completion: {}%", record.completion_percent());
    if record.is_complete() {
        eprintln!("All sections are complete.");
    } else {
        eprintln!("Continue with: {landing}");
    }

    Ok(())
}

fn print_section(view: &SectionView) {
    let marker = if view.active { ">" } else { " " };
    let lock = if view.editable { "" } else { " [locked]" };
    println!(
        "{marker} {}. {:<28} {}{lock}",
        view.position, view.display_name, view.status
    );
    if let Some(feedback) = &view.feedback {
        println!("      feedback: {feedback}");
    }
    for doc in &view.documents {
        match &doc.url {
            Some(url) => println!("      {}: {url}", doc.kind),
            None => println!("      {}: (not uploaded)", doc.kind),
        }
    }
}
