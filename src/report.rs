//! SARIF rendering of weaving conflicts.

use serde_json::json;
use serde_sarif::sarif::{
    Artifact, Invocation, Location, LogicalLocation, Message, ReportingDescriptor,
    Result as SarifResult, ResultLevel, Run, SCHEMA_URL, Sarif, Tool, ToolComponent,
};

use crate::conflict::Conflict;

struct RuleMetadata {
    id: &'static str,
    description: &'static str,
}

const RULES: [RuleMetadata; 6] = [
    RuleMetadata {
        id: "final-override",
        description: "Advice needs an override of an inherited final method.",
    },
    RuleMetadata {
        id: "mixin-interface-collision",
        description: "A mixin contributes an interface the class already has.",
    },
    RuleMetadata {
        id: "shim-target-missing",
        description: "A shim proxy has no target method on the class.",
    },
    RuleMetadata {
        id: "unbindable-parameter",
        description: "An advice parameter cannot bind to the matched method.",
    },
    RuleMetadata {
        id: "rejected-advice",
        description: "An advice definition failed to compile.",
    },
    RuleMetadata {
        id: "duplicate-mixin",
        description: "A mixin id is registered more than once.",
    },
];

pub fn build_sarif(
    conflicts: &[Conflict],
    artifacts: Vec<Artifact>,
    invocation: Invocation,
) -> Sarif {
    let rules: Vec<ReportingDescriptor> = RULES
        .iter()
        .map(|rule| {
            ReportingDescriptor::builder()
                .id(rule.id)
                .short_description(&rule.description.to_string())
                .build()
        })
        .collect();
    let driver = ToolComponent::builder()
        .name("weaveplan")
        .version(env!("CARGO_PKG_VERSION"))
        .rules(rules)
        .build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let results: Vec<SarifResult> = conflicts.iter().map(conflict_result).collect();
    let run = if artifacts.is_empty() {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .build()
    } else {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .artifacts(artifacts)
            .build()
    };

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

pub fn build_invocation(successful: bool) -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(successful)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

fn conflict_result(conflict: &Conflict) -> SarifResult {
    let rule_index = RULES
        .iter()
        .position(|rule| rule.id == conflict.rule_id())
        .unwrap_or_default() as i64;
    let message = result_message(conflict.to_string());
    match conflict.location() {
        Some((class_name, method)) => {
            let location = match method {
                Some((method_name, descriptor)) => {
                    method_location(class_name, method_name, descriptor)
                }
                None => class_location(class_name),
            };
            SarifResult::builder()
                .rule_id(conflict.rule_id())
                .rule_index(rule_index)
                .level(ResultLevel::Warning)
                .message(message)
                .locations(vec![location])
                .build()
        }
        None => SarifResult::builder()
            .rule_id(conflict.rule_id())
            .rule_index(rule_index)
            .level(ResultLevel::Warning)
            .message(message)
            .build(),
    }
}

fn method_location(class_name: &str, method_name: &str, descriptor: &str) -> Location {
    let logical = LogicalLocation::builder()
        .name(format!("{class_name}.{method_name}{descriptor}"))
        .kind("function")
        .build();
    Location::builder().logical_locations(vec![logical]).build()
}

fn class_location(class_name: &str) -> Location {
    let logical = LogicalLocation::builder()
        .name(class_name)
        .kind("type")
        .build();
    Location::builder().logical_locations(vec![logical]).build()
}

fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}
