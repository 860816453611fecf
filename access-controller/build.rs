use std::fs;

use access_types::{AccessBinding, AccessRequest, RoleTemplate};
use kube::CustomResourceExt;

fn main() {
    fs::create_dir_all("../crds").unwrap();
    fs::write(
        "../crds/access.platform.io_accessrequests_crd.yaml",
        serde_yaml::to_string(&AccessRequest::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/access.platform.io_roletemplates_crd.yaml",
        serde_yaml::to_string(&RoleTemplate::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/access.platform.io_accessbindings_crd.yaml",
        serde_yaml::to_string(&AccessBinding::crd()).unwrap(),
    )
    .unwrap();
}
