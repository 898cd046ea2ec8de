use casbin::prelude::DefaultModel;

use crate::errors::{AuthzError, AuthzResult};

// Subjects inherit through `g` edges (child, parent); objects and actions match exactly.
const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

pub fn casbin_model_string() -> &'static str {
    MODEL
}

pub async fn casbin_model() -> AuthzResult<DefaultModel> {
    DefaultModel::from_str(MODEL)
        .await
        .map_err(AuthzError::engine("load embedded model"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use casbin::Model;

    #[test]
    fn model_string_uses_exact_object_match() {
        let model = casbin_model_string();
        assert!(model.contains("r.obj == p.obj"));
        assert!(model.contains("g = _, _"));
        assert!(!model.contains("keyMatch"));
    }

    #[tokio::test]
    async fn model_builds() {
        let model = casbin_model().await.expect("model");
        let data = model.get_model();
        assert!(data.contains_key("r"));
        assert!(data.contains_key("p"));
        assert!(data.contains_key("g"));
    }
}
