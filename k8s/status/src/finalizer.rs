//! Finalizer management (§4.9 steps 1-2): holding a finalizer on every group
//! member keeps the object around, still visible to the watch index, until
//! this controller has torn down the group's AWS resources.

use lbc_k8s_api::{Api, Error, Patch, PatchParams, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub fn name(controller_name: &str) -> String {
    format!("{controller_name}/resources")
}

pub async fn ensure<K>(api: &Api<K>, object_name: &str, finalizer: &str) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
{
    let current = api.get(object_name).await?;
    if current.finalizers().iter().any(|f| f == finalizer) {
        return Ok(());
    }

    let mut finalizers = current.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(object_name, &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(())
}

pub async fn remove<K>(api: &Api<K>, object_name: &str, finalizer: &str) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
{
    let current = match api.get(object_name).await {
        Ok(current) => current,
        Err(Error::Api(e)) if e.code == 404 => return Ok(()),
        Err(e) => return Err(e),
    };
    if !current.finalizers().iter().any(|f| f == finalizer) {
        return Ok(());
    }

    let remaining: Vec<String> = current
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect();
    let patch = serde_json::json!({ "metadata": { "finalizers": remaining } });
    api.patch(object_name, &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_scoped_under_the_controller_name() {
        assert_eq!(name("elbv2.k8s.aws"), "elbv2.k8s.aws/resources");
    }
}
