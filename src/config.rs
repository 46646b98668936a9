// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Container image configuration for the operator.
//!
//! The images the operator deploys are pinned from the process environment
//! by whoever ships the operator (`RELATED_IMAGE_*` variables), and can be
//! overridden per-slot in the `CSIDriverDeployment` spec. Resolution order
//! is override > environment > pinned upstream default; the driver image has
//! no default.

use crate::constants::{
    DEFAULT_IMAGE_ATTACHER, DEFAULT_IMAGE_LIVENESS_PROBE, DEFAULT_IMAGE_NODE_REGISTRAR,
    DEFAULT_IMAGE_PROVISIONER, DEFAULT_IMAGE_RESIZER, DEFAULT_IMAGE_SNAPSHOTTER,
    ENV_IMAGE_ATTACHER, ENV_IMAGE_DRIVER, ENV_IMAGE_LIVENESS_PROBE, ENV_IMAGE_NODE_REGISTRAR,
    ENV_IMAGE_PROVISIONER, ENV_IMAGE_RESIZER, ENV_IMAGE_SNAPSHOTTER,
};
use crate::crd::ImageOverrides;
use crate::error::Error;

/// Image slots sourced from the process environment.
///
/// All slots are optional at load time; [`ImageConfig::resolve`] enforces
/// that the driver slot ends up populated.
#[derive(Clone, Debug, Default)]
pub struct ImageConfig {
    /// CSI driver plugin image
    pub driver: Option<String>,
    /// external-provisioner sidecar image
    pub provisioner: Option<String>,
    /// external-attacher sidecar image
    pub attacher: Option<String>,
    /// external-resizer sidecar image
    pub resizer: Option<String>,
    /// external-snapshotter sidecar image
    pub snapshotter: Option<String>,
    /// node-driver-registrar sidecar image
    pub node_registrar: Option<String>,
    /// liveness-probe sidecar image
    pub liveness_probe: Option<String>,
}

/// Fully resolved images for one reconcile pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedImages {
    pub driver: String,
    pub provisioner: String,
    pub attacher: String,
    pub resizer: String,
    pub snapshotter: String,
    pub node_registrar: String,
    pub liveness_probe: String,
}

impl ImageConfig {
    /// Load the image slots from the `RELATED_IMAGE_*` environment variables.
    ///
    /// Unset or empty variables leave the slot empty.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            driver: env_slot(ENV_IMAGE_DRIVER),
            provisioner: env_slot(ENV_IMAGE_PROVISIONER),
            attacher: env_slot(ENV_IMAGE_ATTACHER),
            resizer: env_slot(ENV_IMAGE_RESIZER),
            snapshotter: env_slot(ENV_IMAGE_SNAPSHOTTER),
            node_registrar: env_slot(ENV_IMAGE_NODE_REGISTRAR),
            liveness_probe: env_slot(ENV_IMAGE_LIVENESS_PROBE),
        }
    }

    /// Resolve the final image per slot for one reconcile pass.
    ///
    /// Spec overrides win over the environment, which wins over the pinned
    /// upstream sidecar defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Builder`] when no driver image is resolvable — a
    /// deployment cannot be built without one.
    pub fn resolve(&self, overrides: Option<&ImageOverrides>) -> Result<ResolvedImages, Error> {
        let pick = |over: Option<&String>, env: Option<&String>, default: Option<&str>| {
            over.cloned()
                .or_else(|| env.cloned())
                .or_else(|| default.map(String::from))
        };

        let driver = pick(
            overrides.and_then(|o| o.driver.as_ref()),
            self.driver.as_ref(),
            None,
        )
        .ok_or_else(|| {
            Error::Builder(format!(
                "no driver image: set spec.images.driver or {ENV_IMAGE_DRIVER}"
            ))
        })?;

        Ok(ResolvedImages {
            driver,
            provisioner: pick(
                overrides.and_then(|o| o.provisioner.as_ref()),
                self.provisioner.as_ref(),
                Some(DEFAULT_IMAGE_PROVISIONER),
            )
            .unwrap_or_default(),
            attacher: pick(
                overrides.and_then(|o| o.attacher.as_ref()),
                self.attacher.as_ref(),
                Some(DEFAULT_IMAGE_ATTACHER),
            )
            .unwrap_or_default(),
            resizer: pick(
                overrides.and_then(|o| o.resizer.as_ref()),
                self.resizer.as_ref(),
                Some(DEFAULT_IMAGE_RESIZER),
            )
            .unwrap_or_default(),
            snapshotter: pick(
                overrides.and_then(|o| o.snapshotter.as_ref()),
                self.snapshotter.as_ref(),
                Some(DEFAULT_IMAGE_SNAPSHOTTER),
            )
            .unwrap_or_default(),
            node_registrar: pick(
                overrides.and_then(|o| o.node_registrar.as_ref()),
                self.node_registrar.as_ref(),
                Some(DEFAULT_IMAGE_NODE_REGISTRAR),
            )
            .unwrap_or_default(),
            liveness_probe: pick(
                overrides.and_then(|o| o.liveness_probe.as_ref()),
                self.liveness_probe.as_ref(),
                Some(DEFAULT_IMAGE_LIVENESS_PROBE),
            )
            .unwrap_or_default(),
        })
    }
}

/// Read one environment slot, treating empty values as unset.
fn env_slot(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}
