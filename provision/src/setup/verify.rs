use crate::context::{NodeRole, ProvisioningContext};
use crate::setup::host::{Component, Host};
use crate::setup::report::VerificationRecord;
use tracing::{info, warn};

/// Post-run checks. Failures are warnings; the node is already provisioned.
pub fn verify(ctx: &ProvisioningContext, host: &Host) -> Vec<VerificationRecord> {
	let mut records = Component::ALL
		.iter()
		.map(|component| VerificationRecord {
			check: format!("{} version", component.binary()),
			outcome: host
				.cluster
				.component_version(*component)
				.map_err(|err| err.to_string()),
		})
		.collect::<Vec<_>>();
	if matches!(ctx.role(), Ok(NodeRole::ControlPlane)) {
		records.push(VerificationRecord {
			check: "cluster nodes".to_owned(),
			outcome: host
				.cluster
				.query_nodes()
				.map(|nodes| nodes.join(", "))
				.map_err(|err| err.to_string()),
		});
	}
	for record in &records {
		match &record.outcome {
			Ok(detail) => info!("Verified {}: {detail}", record.check),
			Err(reason) => warn!("Verification of {} failed: {reason}", record.check),
		}
	}
	records
}
