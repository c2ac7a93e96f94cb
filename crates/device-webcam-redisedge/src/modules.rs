//! Startup gate on the extension modules loaded into the server.

use std::collections::BTreeMap;

use tracing::{debug, error};

use crate::connection::{EdgeConnection, ModuleInfo};
use crate::error::{MissingModules, Result, UnmetModule};

/// Fetches the installed modules in one round trip and checks them against
/// `required` (module name -> minimum version).
///
/// Every unmet requirement is reported, not only the first.
pub async fn verify_modules<E>(conn: &mut E, required: &BTreeMap<String, i64>) -> Result<()>
where
    E: EdgeConnection + ?Sized,
{
    debug!("verifying RedisEdge modules");

    let installed = conn.module_list().await.map_err(|err| {
        error!("failed getting modules list: {err}");
        err
    })?;

    check_requirements(&installed, required).map_err(|missing| {
        for module in &missing.modules {
            error!("missing requisite RedisEdge module - {module}");
        }
        missing
    })?;

    debug!("RedisEdge modules verified");
    Ok(())
}

/// Pure half of [`verify_modules`].
pub fn check_requirements(
    installed: &[ModuleInfo],
    required: &BTreeMap<String, i64>,
) -> std::result::Result<(), MissingModules> {
    let mut pending = required.clone();
    // Highest version seen per pending module, for error reporting.
    let mut seen: BTreeMap<&str, i64> = BTreeMap::new();

    for module in installed {
        if pending.is_empty() {
            break;
        }
        let Some(&min_version) = pending.get(&module.name) else {
            continue;
        };
        if module.version >= min_version {
            pending.remove(&module.name);
        } else {
            let best = seen.entry(module.name.as_str()).or_insert(module.version);
            *best = (*best).max(module.version);
        }
    }

    if pending.is_empty() {
        return Ok(());
    }

    let modules = pending
        .into_iter()
        .map(|(name, min_version)| UnmetModule {
            installed: seen.get(name.as_str()).copied(),
            name,
            min_version,
        })
        .collect();
    Err(MissingModules { modules })
}
