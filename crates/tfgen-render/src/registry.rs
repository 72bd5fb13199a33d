//! Fixed template registry.
//!
//! One embedded Handlebars template per `(platform, kind)` pair. Adding a
//! resource type is a new `.tf.hbs` file plus one row here.

pub static TEMPLATES: [(&str, &str); 20] = [
    // AWS
    ("aws_vpc", include_str!("../templates/aws/vpc.tf.hbs")),
    ("aws_subnet", include_str!("../templates/aws/subnet.tf.hbs")),
    (
        "aws_security_group",
        include_str!("../templates/aws/security_group.tf.hbs"),
    ),
    ("aws_ec2", include_str!("../templates/aws/ec2.tf.hbs")),
    ("aws_s3", include_str!("../templates/aws/s3.tf.hbs")),
    ("aws_rds", include_str!("../templates/aws/rds.tf.hbs")),
    (
        "aws_internet_gateway",
        include_str!("../templates/aws/internet_gateway.tf.hbs"),
    ),
    (
        "aws_nat_gateway",
        include_str!("../templates/aws/nat_gateway.tf.hbs"),
    ),
    (
        "aws_elastic_ip",
        include_str!("../templates/aws/elastic_ip.tf.hbs"),
    ),
    (
        "aws_load_balancer",
        include_str!("../templates/aws/load_balancer.tf.hbs"),
    ),
    // Azure
    (
        "azure_resource_group",
        include_str!("../templates/azure/resource_group.tf.hbs"),
    ),
    ("azure_vnet", include_str!("../templates/azure/vnet.tf.hbs")),
    (
        "azure_subnet",
        include_str!("../templates/azure/subnet.tf.hbs"),
    ),
    ("azure_nsg", include_str!("../templates/azure/nsg.tf.hbs")),
    ("azure_vm", include_str!("../templates/azure/vm.tf.hbs")),
    (
        "azure_storage",
        include_str!("../templates/azure/storage.tf.hbs"),
    ),
    ("azure_sql", include_str!("../templates/azure/sql.tf.hbs")),
    (
        "azure_public_ip",
        include_str!("../templates/azure/public_ip.tf.hbs"),
    ),
    (
        "azure_nat_gateway",
        include_str!("../templates/azure/nat_gateway.tf.hbs"),
    ),
    (
        "azure_load_balancer",
        include_str!("../templates/azure/load_balancer.tf.hbs"),
    ),
];

pub fn template_for(kind: &str) -> Option<&'static str> {
    TEMPLATES
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, source)| *source)
}

/// Registry keys, for error messages listing what is available.
pub fn available_kinds() -> Vec<&'static str> {
    TEMPLATES.iter().map(|(name, _)| *name).collect()
}
