//! Configuration resolution.
//!
//! A project is described by YAML documents that may extend each other:
//! 1. **Extend chain** - `bootstrap:extend` names base documents, loaded depth first
//! 2. **Version pins** - `odoo.versions.yaml`, merged last when present
//! 3. **Environment** - fixed variables and `ODOO_<OPTION>` overrides
//!
//! ## Merge Strategy
//! - Mappings merge key by key, sequences concatenate, sets union
//! - `merges` lists are replaced instead of concatenated
//!
//! ## Environment Variables
//! - `ODOO_VERSION` - Platform version (`odoo:version`)
//! - `BOOTSTRAP_MODE` - Active modes (`bootstrap:mode`)
//! - `BOOTSTRAP_DEBUGGER` - Debugger used by `dob run` (`bootstrap:debugger`)
//! - `ODOO_<KEY>` - Overrides the existing option `odoo:options:<key>`

mod generate;
mod loader;
mod merge;
mod substitute;
mod types;
mod value;

pub use generate::{generate_runtime_config, render_runtime_config};
pub use loader::{
    ADDON_PATH, CONFIG_CANDIDATES, ConfigLoader, ENVIRONMENT, EnvVars, ProjectPaths,
    RUNTIME_CONFIG, SECTION, VERSIONS_FILE, normalize_path,
};
pub use merge::{merge, merge_all};
pub use substitute::{substitute, substitute_str};
pub use types::Config;
pub use value::{ConfigValue, Mapping, split_path};
