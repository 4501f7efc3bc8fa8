//! CRD YAML generator
//!
//! Prints the VMops CRD manifests to stdout, separated by YAML document
//! markers, for checking into deploy manifests.

use crds::{AddressClaim, VirtualMachine};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&VirtualMachine::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&AddressClaim::crd())?);
    Ok(())
}
