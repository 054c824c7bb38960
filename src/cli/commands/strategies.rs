//! List strategies command.

use anyhow::Result;
use autotrade_strategies::StrategyRegistry;

pub async fn run() -> Result<()> {
    let registry = StrategyRegistry::new();

    println!("Available Strategies");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    for info in registry.list() {
        println!("  {} ", info.name);
        println!("  ───────────────────────────────────────────────────────");
        println!("  {}", info.description);
        println!();
        println!("  Default parameters:");
        for (key, value) in info.default_parameters.iter() {
            println!("    {:<28} {}", key, value);
        }
        println!();
    }

    println!("Numeric parameters accept ranges as min:step:max for backtest-range.");

    Ok(())
}
