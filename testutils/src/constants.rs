pub const TEST_NAMESPACE: &str = "test-namespace";
pub const TEST_CLUSTER_LABEL: &str = "test-cluster";
pub const TEST_KUBERNETES_HOST: &str = "https://127.0.0.1:6443";
