//! `agentloop tools`: list the built-in tools.

pub fn list() -> Result<(), Box<dyn std::error::Error>> {
    let registry = agentloop_tools::default_registry();

    println!("Tools ({})", registry.len());
    println!("====================");
    for def in registry.definitions() {
        println!();
        println!("  {}", def.name);
        println!("    {}", def.description);
        println!("    parameters: {}", serde_json::to_string(&def.parameters)?);
    }
    Ok(())
}
