//! `agentloop memory`: inspect session memory and the experience log.

use agentloop_config::AppConfig;
use agentloop_memory::{Stores, open_stores};

fn stores() -> Result<(AppConfig, Stores), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.memory.backend == "in_memory" {
        eprintln!("  Memory backend is 'in_memory'; nothing persists between runs.");
    }
    let stores = open_stores(&config.memory);
    Ok((config, stores))
}

pub async fn sessions() -> Result<(), Box<dyn std::error::Error>> {
    let (config, stores) = stores()?;
    let mut entries = stores.memory.all().await?;
    entries.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));

    println!("Session Memory ({})", config.memory.backend);
    println!("====================");
    if entries.is_empty() {
        println!("  No live session summaries.");
        return Ok(());
    }

    for entry in &entries {
        let s = &entry.summary;
        println!();
        println!("  {}", entry.session_id);
        println!("    request:  {}", s.user_request);
        if !s.completed_tasks.is_empty() {
            println!("    done:     {}", s.completed_tasks.join(", "));
        }
        if !s.pending_tasks.is_empty() {
            println!("    pending:  {}", s.pending_tasks.join(", "));
        }
        println!(
            "    updated:  {}  (expires {})",
            entry.last_updated_at.format("%Y-%m-%d %H:%M:%S"),
            entry.expires_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub async fn experience(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let (config, stores) = stores()?;
    let total = stores.experience.len().await?;
    let entries = stores.experience.recent(limit).await?;

    println!(
        "Experience Log ({total} of at most {} entries)",
        config.memory.experience_cap
    );
    println!("====================");
    for entry in entries.iter().rev() {
        println!();
        println!(
            "  {}  {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.task_type
        );
        if !entry.execution_order.is_empty() {
            println!("    order: {}", entry.execution_order.join(" -> "));
        }
        for point in &entry.key_points {
            println!("    - {point}");
        }
    }
    Ok(())
}

pub async fn purge() -> Result<(), Box<dyn std::error::Error>> {
    let (_, stores) = stores()?;
    let removed = stores.memory.purge_expired().await?;
    println!("Removed {removed} expired session summaries.");
    Ok(())
}
