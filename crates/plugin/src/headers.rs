use conduit_core::{ActionConfiguration, Property};

/// Remove properties whose key is blank. Insertion order is preserved.
pub fn strip_blank(properties: &mut Vec<Property>) {
    properties.retain(|p| !p.is_blank());
}

/// User headers followed by every auto-generated header whose name the user
/// did not already set. Names compare case-insensitively.
pub fn merge_auto_generated(headers: &[Property], auto_generated: &[Property]) -> Vec<Property> {
    let mut merged = headers.to_vec();
    for auto in auto_generated {
        let taken = merged
            .iter()
            .any(|h| h.key.trim().eq_ignore_ascii_case(auto.key.trim()));
        if !taken {
            merged.push(auto.clone());
        }
    }
    merged
}

/// Drop everything that should not be sent: blank headers, query parameters
/// and form fields. Auto-generated headers are folded into `headers`.
pub fn sanitize_action(action: &mut ActionConfiguration) {
    strip_blank(&mut action.headers);
    strip_blank(&mut action.auto_generated_headers);
    strip_blank(&mut action.query_parameters);
    strip_blank(&mut action.body_form_data);
    strip_blank(&mut action.plugin_specified_templates);

    let auto_generated = std::mem::take(&mut action.auto_generated_headers);
    action.headers = merge_auto_generated(&action.headers, &auto_generated);
}

/// Prepend datasource-level properties to action-level ones.
pub fn layered(datasource: &[Property], action: &[Property]) -> Vec<Property> {
    datasource
        .iter()
        .filter(|p| !p.is_blank())
        .chain(action.iter())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use conduit_core::HttpMethod;

    use super::*;

    #[test]
    fn blank_headers_are_not_sent() {
        let mut action = ActionConfiguration::new(HttpMethod::Get, "/")
            .with_header("", "orphan")
            .with_header("  ", "")
            .with_header("Accept", "application/json")
            .with_query_parameter("", "x");
        sanitize_action(&mut action);
        assert_eq!(action.headers, vec![Property::new("Accept", "application/json")]);
        assert!(action.query_parameters.is_empty());
    }

    #[test]
    fn user_header_beats_auto_generated() {
        let mut action = ActionConfiguration::new(HttpMethod::Post, "/")
            .with_header("content-type", "text/plain");
        action.auto_generated_headers = vec![
            Property::new("Content-Type", "application/json"),
            Property::new("User-Agent", "conduit"),
        ];
        sanitize_action(&mut action);
        assert_eq!(
            action.headers,
            vec![
                Property::new("content-type", "text/plain"),
                Property::new("User-Agent", "conduit"),
            ]
        );
        assert!(action.auto_generated_headers.is_empty());
    }

    #[test]
    fn duplicate_user_headers_are_kept_in_order() {
        let merged = merge_auto_generated(
            &[Property::new("X-Tag", "a"), Property::new("X-Tag", "b")],
            &[],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].value, "b");
    }

    #[test]
    fn datasource_properties_come_first() {
        let merged = layered(
            &[Property::new("X-Tenant", "t1"), Property::new("", "skip")],
            &[Property::new("X-Trace", "abc")],
        );
        assert_eq!(merged[0].key, "X-Tenant");
        assert_eq!(merged[1].key, "X-Trace");
        assert_eq!(merged.len(), 2);
    }
}
