//! Pre-filled sample workbooks.
//!
//! Mirrors the sample row shipped in the downloadable template: every
//! required column populated so an unedited upload flows through collection.

use serde_json::json;

use tfgen_core::Platform;

use crate::{Sheet, Workbook};

/// A one-row-per-core-type workbook for the given platform.
pub fn sample_workbook(platform: Platform) -> Workbook {
    match platform {
        Platform::Aws => aws_sample(),
        Platform::Azure => azure_sample(),
    }
}

fn aws_sample() -> Workbook {
    let mut ec2 = Sheet::new(
        "AWS_EC2",
        vec![
            "ResourceName*",
            "Region*",
            "InstanceType*",
            "AMI*",
            "KeyPairName",
            "Environment",
            "Project",
            "Tags",
        ],
    );
    ec2.push_row(vec![
        json!("web-server"),
        json!("us-east-1"),
        json!("t2.micro"),
        json!("ami-0c55b159cbfafe1f0"),
        json!("deploy-key"),
        json!("Development"),
        json!("Sample"),
        json!(r#"{"Application": "Web"}"#),
    ]);

    let mut vpc = Sheet::new(
        "AWS_VPC",
        vec!["ResourceName*", "Region*", "CIDR_Block*", "Project"],
    );
    vpc.push_row(vec![
        json!("main-vpc"),
        json!("us-east-1"),
        json!("10.0.0.0/16"),
        json!("Sample"),
    ]);

    let mut s3 = Sheet::new(
        "AWS_S3",
        vec!["ResourceName*", "Region*", "BucketName*", "Versioning", "Project"],
    );
    s3.push_row(vec![
        json!("assets"),
        json!("us-east-1"),
        json!("sample-assets-bucket"),
        json!("true"),
        json!("Sample"),
    ]);

    Workbook {
        sheets: vec![ec2, vpc, s3],
    }
}

fn azure_sample() -> Workbook {
    let mut vm = Sheet::new(
        "Azure_VM",
        vec![
            "ResourceName*",
            "ResourceGroup*",
            "Location*",
            "VMSize*",
            "AdminUsername*",
            "OSType*",
            "ImagePublisher",
            "ImageOffer",
            "ImageSKU",
            "SshPublicKey",
            "Environment",
            "Project",
        ],
    );
    vm.push_row(vec![
        json!("app-vm"),
        json!("rg-sample"),
        json!("eastus"),
        json!("Standard_B2s"),
        json!("azureadmin"),
        json!("Linux"),
        json!("Canonical"),
        json!("0001-com-ubuntu-server-jammy"),
        json!("22_04-lts"),
        json!("ssh-rsa AAAAB3NzaC1yc2E sample"),
        json!("Development"),
        json!("Sample"),
    ]);

    let mut vnet = Sheet::new(
        "Azure_VNet",
        vec!["ResourceName*", "ResourceGroup*", "Location*", "AddressSpace*", "Project"],
    );
    vnet.push_row(vec![
        json!("main-vnet"),
        json!("rg-sample"),
        json!("eastus"),
        json!("10.0.0.0/16"),
        json!("Sample"),
    ]);

    let mut storage = Sheet::new(
        "Azure_Storage",
        vec![
            "ResourceName*",
            "ResourceGroup*",
            "Location*",
            "StorageAccountName*",
            "Project",
        ],
    );
    storage.push_row(vec![
        json!("sampledata"),
        json!("rg-sample"),
        json!("eastus"),
        json!("sampledatastore"),
        json!("Sample"),
    ]);

    Workbook {
        sheets: vec![vm, vnet, storage],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SheetParser;

    #[test]
    fn test_samples_parse_cleanly() {
        for platform in [Platform::Aws, Platform::Azure] {
            let result = SheetParser::new().parse(&sample_workbook(platform));
            assert!(result.success, "{platform}: {:?}", result.errors);
            assert!(result.resource_count >= 1);
            assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        }
    }
}
