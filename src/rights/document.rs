use crate::rights::errors::RightsError;
use crate::rights::types::*;
use kdl::{KdlDocument, KdlEntry, KdlNode};

/// Parse a KDL rights document and check it against the document rules.
pub fn parse_document(source: &str) -> Result<ConfigurationDocument, RightsError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| RightsError::KdlParse(e.to_string()))?;

    let mut mode = None;
    let mut profiles = Vec::new();
    let mut user_profiles = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "mode" => {
                let value = first_string_arg(node).ok_or_else(|| {
                    RightsError::InvalidDocument(
                        "mode node requires a string argument (e.g. mode \"allow-listed\")".into(),
                    )
                })?;
                let parsed = PolicyMode::parse(&value).ok_or_else(|| {
                    RightsError::InvalidDocument(format!(
                        "unknown mode `{value}` (expected \"allow-listed\" or \"deny-listed\")"
                    ))
                })?;
                if mode.replace(parsed).is_some() {
                    return Err(RightsError::InvalidDocument(
                        "a rights document declares exactly one mode".into(),
                    ));
                }
            }
            "profile" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    RightsError::InvalidDocument(
                        "profile node requires a string argument (e.g. profile \"editor\")".into(),
                    )
                })?;

                let mut actions = Vec::new();
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "actions" => {
                                actions = dash_list(child);
                            }
                            other => {
                                return Err(RightsError::InvalidDocument(format!(
                                    "unexpected child `{other}` in profile `{name}` (expected `actions`)"
                                )));
                            }
                        }
                    }
                }

                profiles.push(Profile::new(&name, actions));
            }
            "userprofile" => {
                let login = first_string_arg(node).ok_or_else(|| {
                    RightsError::InvalidDocument(
                        "userprofile node requires a login argument (e.g. userprofile \"alice\")"
                            .into(),
                    )
                })?;

                let mut references = Vec::new();
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "profiles" => {
                                references = dash_list(child);
                            }
                            other => {
                                return Err(RightsError::InvalidDocument(format!(
                                    "unexpected child `{other}` in userprofile `{login}` (expected `profiles`)"
                                )));
                            }
                        }
                    }
                }

                user_profiles.push(UserProfile::new(&login, references));
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    let mode = mode.ok_or_else(|| {
        RightsError::InvalidDocument("missing `mode` node".into())
    })?;

    let document = ConfigurationDocument {
        mode,
        profiles,
        user_profiles,
    };
    document.validate()?;
    Ok(document)
}

/// Render a document back to KDL. Origins are implied by the file a document is stored in.
pub fn render_document(document: &ConfigurationDocument) -> String {
    let mut doc = KdlDocument::new();

    let mut mode = KdlNode::new("mode");
    mode.push(KdlEntry::new(document.mode.as_str()));
    doc.nodes_mut().push(mode);

    for profile in &document.profiles {
        let mut node = KdlNode::new("profile");
        node.push(KdlEntry::new(profile.name.as_str()));
        node.ensure_children()
            .nodes_mut()
            .push(dash_node("actions", profile.actions.iter().map(String::as_str)));
        doc.nodes_mut().push(node);
    }

    for user_profile in &document.user_profiles {
        let mut node = KdlNode::new("userprofile");
        node.push(KdlEntry::new(user_profile.login.as_str()));
        node.ensure_children().nodes_mut().push(dash_node(
            "profiles",
            user_profile.profiles.iter().map(|r| r.name.as_str()),
        ));
        doc.nodes_mut().push(node);
    }

    doc.autoformat();
    doc.to_string()
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
/// ```kdl
/// actions {
///     - "edit"
///     - "view"
/// }
/// ```
fn dash_list(node: &KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}

fn dash_node<'a>(name: &str, items: impl Iterator<Item = &'a str>) -> KdlNode {
    let mut node = KdlNode::new(name);
    let children = node.ensure_children();
    for item in items {
        let mut dash = KdlNode::new("-");
        dash.push(KdlEntry::new(item));
        children.nodes_mut().push(dash);
    }
    node
}
