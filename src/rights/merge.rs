use std::collections::HashSet;

use crate::rights::errors::RightsError;
use crate::rights::types::*;

/// Combine the default layer with the optional administrator layer.
///
/// Entries are keyed by name (profiles) and login (user profiles). An override
/// entry replaces the default entry of the same key as a whole; entries coming
/// from `base` are tagged [`Origin::Default`], entries from `layer` are tagged
/// [`Origin::Modification`]. Override entries come first, in document order,
/// followed by the surviving default entries.
pub fn merge(
    base: ConfigurationDocument,
    layer: Option<ConfigurationDocument>,
) -> Result<Auth, RightsError> {
    let Some(layer) = layer else {
        return Ok(Auth {
            mode: base.mode,
            profiles: tag(base.profiles, Origin::Default, |p, o| p.with_origin(o)),
            user_profiles: tag(base.user_profiles, Origin::Default, |u, o| u.with_origin(o)),
        });
    };

    if layer.mode != base.mode {
        return Err(RightsError::PolicyModeConflict {
            base: base.mode,
            layer: layer.mode,
        });
    }

    let shadowed: HashSet<String> = layer.profiles.iter().map(|p| p.name.clone()).collect();
    let mut profiles = tag(layer.profiles, Origin::Modification, |p, o| p.with_origin(o));
    profiles.extend(
        base.profiles
            .into_iter()
            .filter(|p| !shadowed.contains(&p.name))
            .map(|p| p.with_origin(Origin::Default)),
    );

    let shadowed: HashSet<String> = layer
        .user_profiles
        .iter()
        .map(|u| u.login.clone())
        .collect();
    let mut user_profiles = tag(layer.user_profiles, Origin::Modification, |u, o| {
        u.with_origin(o)
    });
    user_profiles.extend(
        base.user_profiles
            .into_iter()
            .filter(|u| !shadowed.contains(&u.login))
            .map(|u| u.with_origin(Origin::Default)),
    );

    Ok(Auth {
        mode: base.mode,
        profiles,
        user_profiles,
    })
}

fn tag<T>(items: Vec<T>, origin: Origin, with_origin: impl Fn(T, Origin) -> T) -> Vec<T> {
    items.into_iter().map(|item| with_origin(item, origin)).collect()
}
