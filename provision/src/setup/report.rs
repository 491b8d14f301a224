use crate::error::{ErrorClass, InstallError};
use std::fmt;

/// Outcome of one step as recorded in the run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
	Success,
	NoOp,
	Skipped,
	RecoverableFailure { reason: String, retryable: bool },
	FatalFailure { reason: String },
}

impl StepResult {
	/// Maps a step error onto the outcome the sequencer acts on.
	pub fn classify(err: &InstallError) -> StepResult {
		match err.class() {
			ErrorClass::StateConflict => StepResult::NoOp,
			ErrorClass::TransientNetwork => StepResult::RecoverableFailure {
				reason: err.to_string(),
				retryable: true,
			},
			ErrorClass::VerificationWarning => StepResult::RecoverableFailure {
				reason: err.to_string(),
				retryable: false,
			},
			ErrorClass::Privilege
			| ErrorClass::Environment
			| ErrorClass::Integrity
			| ErrorClass::Fatal => StepResult::FatalFailure {
				reason: err.to_string(),
			},
		}
	}

	pub fn is_fatal(&self) -> bool {
		matches!(self, StepResult::FatalFailure { .. })
	}
}

impl fmt::Display for StepResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StepResult::Success => f.write_str("done"),
			StepResult::NoOp => f.write_str("already satisfied"),
			StepResult::Skipped => f.write_str("skipped (control-plane only)"),
			StepResult::RecoverableFailure { reason, .. } => write!(f, "warning: {reason}"),
			StepResult::FatalFailure { reason } => write!(f, "FAILED: {reason}"),
		}
	}
}

/// What a successful `set` produced beyond host mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
	Done,
	/// Applied, but a follow-up check did not converge in time.
	Warned(String),
	Issued(JoinCredential),
}

/// One-time credential a worker uses to join the cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct JoinCredential {
	pub token: String,
	pub ca_cert_hash: String,
	pub control_plane_endpoint: String,
}

impl JoinCredential {
	pub fn join_command(&self) -> String {
		format!(
			"kubeadm join {} --token {} --discovery-token-ca-cert-hash {}",
			self.control_plane_endpoint, self.token, self.ca_cert_hash
		)
	}
}

impl fmt::Debug for JoinCredential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JoinCredential")
			.field("token", &"<redacted>")
			.field("ca_cert_hash", &self.ca_cert_hash)
			.field("control_plane_endpoint", &self.control_plane_endpoint)
			.finish()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
	pub step: &'static str,
	pub description: &'static str,
	pub result: StepResult,
	pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRecord {
	pub check: String,
	pub outcome: Result<String, String>,
}

#[derive(Debug, Default)]
pub struct RunReport {
	pub steps: Vec<StepRecord>,
	pub verification: Vec<VerificationRecord>,
	pub join_credential: Option<JoinCredential>,
}

impl RunReport {
	pub fn failed_step(&self) -> Option<&StepRecord> {
		self.steps.iter().find(|record| record.result.is_fatal())
	}

	pub fn succeeded(&self) -> bool {
		self.failed_step().is_none()
	}

	pub fn exit_code(&self) -> i32 {
		if self.succeeded() {
			0
		} else {
			1
		}
	}

	pub fn result_of(&self, step: &str) -> Option<&StepResult> {
		self.steps
			.iter()
			.find(|record| record.step == step)
			.map(|record| &record.result)
	}
}

impl fmt::Display for RunReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "Provisioning report:")?;
		for record in &self.steps {
			write!(f, "  [{}] {}: {}", record.step, record.description, record.result)?;
			if record.attempts > 1 {
				write!(f, " (after {} attempts)", record.attempts)?;
			}
			writeln!(f)?;
		}
		if !self.verification.is_empty() {
			writeln!(f, "Verification:")?;
			for record in &self.verification {
				match &record.outcome {
					Ok(detail) => writeln!(f, "  {}: {}", record.check, detail)?,
					Err(reason) => writeln!(f, "  {}: warning: {}", record.check, reason)?,
				}
			}
		}
		if let Some(failed) = self.failed_step() {
			writeln!(f, "Provisioning aborted at step '{}'.", failed.step)?;
		}
		if let Some(credential) = &self.join_credential {
			writeln!(f, "Run on each worker node to join the cluster:")?;
			writeln!(f, "  {}", credential.join_command())?;
		}
		Ok(())
	}
}
