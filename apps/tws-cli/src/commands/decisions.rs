// decisions.rs — List decisions and the goal each resolves to.

use tws_goal::{TopologyConfig, TopologyDecision};

pub fn execute(config: &TopologyConfig) -> anyhow::Result<()> {
    println!("{:<8} {:<40} {}", "ID", "DECISION", "GOAL");
    println!("{}", "-".repeat(84));

    for decision in TopologyDecision::ALL {
        println!(
            "{:<8} {:<40} {}",
            decision.id().to_string(),
            decision.as_str(),
            decision.goal(config),
        );
    }

    let handover = if config.handover.dynamic_handover_supported {
        "dynamic"
    } else {
        "static"
    };
    println!(
        "\n{} decision(s), {} handover.",
        TopologyDecision::ALL.len(),
        handover
    );
    Ok(())
}
