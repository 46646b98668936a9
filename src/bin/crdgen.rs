// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates the CSIDriverDeployment CRD YAML from the Rust types in
//! src/crd.rs, so the manifest in deploy/crds/ is always in sync with the
//! code.
//!
//! Usage:
//!   cargo run --bin crdgen

use castor::crd::CSIDriverDeployment;
use kube::CustomResourceExt;
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = Path::new("deploy/crds");
    fs::create_dir_all(output_dir)?;

    println!("Generating CRD YAML files from src/crd.rs...");

    let crd = CSIDriverDeployment::crd();
    let yaml = serde_yaml::to_string(&crd)?;
    let content = format!("{COPYRIGHT_HEADER}{yaml}");

    let output_path = output_dir.join("csidriverdeployments.crd.yaml");
    fs::write(&output_path, content)?;

    println!("  ✓ Generated csidriverdeployments.crd.yaml");
    println!("✓ Successfully generated CRD YAML files in deploy/crds/");

    Ok(())
}
