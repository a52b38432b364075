//! Facts command: show what the reports would say about this host

use convenient_metrics::{LocalHost, SystemFactProvider, SystemFacts};
use std::time::Duration;

/// Resolve and print the system facts
pub fn execute(json: bool, command_timeout_secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    let provider =
        SystemFactProvider::new(LocalHost::new(Duration::from_secs(command_timeout_secs)));
    let facts = provider.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&facts)?);
    } else {
        print!("{}", render(&facts));
    }
    Ok(())
}

fn render(facts: &SystemFacts) -> String {
    format!(
        "OS: {}\nProcessor: {}\nTotal RAM: {} MB\nMax Heap Memory: {} MB\n",
        facts.os_name_and_version,
        facts.processor_name,
        facts.total_physical_ram_mb,
        facts.max_heap_mb
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let facts = SystemFacts {
            os_name_and_version: "Linux 6.8.0".to_string(),
            processor_name: "Test CPU".to_string(),
            total_physical_ram_mb: 16_384,
            max_heap_mb: 0,
        };
        assert_eq!(
            render(&facts),
            "OS: Linux 6.8.0\nProcessor: Test CPU\nTotal RAM: 16384 MB\nMax Heap Memory: 0 MB\n"
        );
    }
}
