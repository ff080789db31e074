// crates/toolhub-core/src/catalog/tests.rs
// ============================================================================
// Module: Catalog Unit Tests
// Description: Uniqueness and referential checks on catalog construction.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions."
)]

use super::Catalog;
use super::CatalogError;
use super::GroupDescriptor;
use super::ToolDescriptor;

fn groups() -> Vec<GroupDescriptor> {
    vec![
        GroupDescriptor::new("core", "general", "Core", true),
        GroupDescriptor::new("search", "web", "Search", false).requiring_config(),
    ]
}

#[test]
fn lookups_resolve_tools_and_groups() {
    let catalog = Catalog::new(
        groups(),
        vec![
            ToolDescriptor::new("echo", "general", "Echo", "Echo input").in_group("core"),
            ToolDescriptor::new("lookup", "web", "Lookup", "Search the web")
                .in_group("search")
                .requires("apiKeys.search")
                .remote(),
            ToolDescriptor::new("loose", "general", "Loose", "No group"),
        ],
    )
    .unwrap();

    assert_eq!(catalog.tool("lookup").unwrap().required_settings, vec!["apiKeys.search"]);
    assert!(catalog.tool("missing").is_none());
    assert_eq!(catalog.group("search").unwrap().title, "Search");
    let echo = catalog.tool("echo").unwrap();
    assert_eq!(catalog.group_of(echo).unwrap().id, "core");
    assert!(catalog.group_of(catalog.tool("loose").unwrap()).is_none());
    let names: Vec<&str> =
        catalog.tools_in_group("search").map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["lookup"]);
}

#[test]
fn duplicate_tool_names_are_rejected() {
    let err = Catalog::new(
        groups(),
        vec![
            ToolDescriptor::new("echo", "general", "Echo", "a"),
            ToolDescriptor::new("echo", "general", "Echo again", "b"),
        ],
    )
    .unwrap_err();
    assert_eq!(err, CatalogError::DuplicateTool("echo".to_string()));
}

#[test]
fn duplicate_group_ids_are_rejected() {
    let mut groups = groups();
    groups.push(GroupDescriptor::new("core", "general", "Core again", false));
    let err = Catalog::new(groups, Vec::new()).unwrap_err();
    assert_eq!(err, CatalogError::DuplicateGroup("core".to_string()));
}

#[test]
fn dangling_group_reference_is_rejected() {
    let err = Catalog::new(
        groups(),
        vec![ToolDescriptor::new("orphan", "general", "Orphan", "x").in_group("nowhere")],
    )
    .unwrap_err();
    assert!(matches!(err, CatalogError::UnknownGroup { ref group, .. } if group == "nowhere"));
}

#[test]
fn blank_names_are_rejected() {
    let err = Catalog::new(groups(), vec![ToolDescriptor::new(" ", "general", "Blank", "x")])
        .unwrap_err();
    assert!(matches!(err, CatalogError::Invalid(_)));
}
