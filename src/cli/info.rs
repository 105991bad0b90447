//! Config info command

use std::path::PathBuf;

use anyhow::Result;

use crate::config::TaskConfig;
use crate::tensor::OneOrMany;

/// Show what a task config resolves to
pub async fn info(config: PathBuf) -> Result<()> {
    let task_config = TaskConfig::load(&config)?;

    println!("Config: {}\n", config.display());
    println!("Model: {}", task_config.model.name());
    println!(
        "Function: {}",
        task_config.function.as_deref().unwrap_or("(call)")
    );
    println!("Input: {}", fields(&task_config.input));
    println!("Output: {}", fields(&task_config.output));
    println!("Dtype: {:?}", task_config.dtype()?);
    match task_config.batch_size {
        Some(n) => println!("Batch size: {}", n),
        None => println!("Batch size: whole input"),
    }
    if !task_config.args.is_empty() {
        println!("Args: {}", task_config.args.len());
    }
    if !task_config.kwargs.is_empty() {
        let names: Vec<&str> = task_config.kwargs.keys().map(String::as_str).collect();
        println!("Kwargs: {}", names.join(", "));
    }

    println!("\nRetry:");
    println!("  Max tries: {}", task_config.retry.max_tries);
    println!("  Timeout: {:?}", task_config.retry.timeout()?);

    println!("\nPool:");
    for id in task_config.pool.device_ids()? {
        println!("  {}", id);
    }

    // Surface validation errors the same way `run` would
    let task = task_config.build_task()?;
    println!("\nTask OK: {:?}", task);

    Ok(())
}

fn fields(fields: &OneOrMany<String>) -> String {
    match fields {
        OneOrMany::One(name) => name.clone(),
        OneOrMany::Many(names) => format!("[{}]", names.join(", ")),
    }
}
