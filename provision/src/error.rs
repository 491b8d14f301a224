use std::{io, process::ExitStatus, string::FromUtf8Error};

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
	#[error("I/O error: {0}.")]
	Io(#[from] io::Error),

	#[error("Failed to execute command '{cmd}': {source}")]
	CommandLaunch {
		cmd: String,
		#[source]
		source: io::Error,
	},

	#[error("Command failed: {cmd} ({status}){}", stderr_suffix(.stderr))]
	CommandFailed {
		cmd: String,
		status: ExitStatus,
		stderr: Option<String>,
	},

	#[error("Step '{step}' failed after attempt to set it.")]
	StepFailed { step: &'static str },

	#[error("Insufficient privilege: {0}.")]
	Privilege(String),

	#[error("Unsupported environment: {0}.")]
	Environment(String),

	#[error("Network error during {op}: {reason}")]
	TransientNetwork { op: String, reason: String },

	#[error("Integrity check failed for {artifact}: expected {expected}, got {actual}.")]
	Integrity {
		artifact: String,
		expected: String,
		actual: String,
	},

	#[error("Host already in desired state: {0}.")]
	StateConflict(String),

	#[error("Verification failed: {0}.")]
	Verification(String),

	#[error("Invalid configuration: {0}.")]
	Config(String),

	#[error("String error: {0}.")]
	StringError(#[from] FromUtf8Error),
}

fn stderr_suffix(stderr: &Option<String>) -> String {
	stderr
		.as_deref()
		.map(|err| format!(": {err}"))
		.unwrap_or_default()
}

/// Failure taxonomy the sequencer decides retry and abort policy on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
	Privilege,
	Environment,
	TransientNetwork,
	Integrity,
	StateConflict,
	VerificationWarning,
	Fatal,
}

impl InstallError {
	pub fn class(&self) -> ErrorClass {
		match self {
			InstallError::Privilege(_) => ErrorClass::Privilege,
			InstallError::Environment(_) => ErrorClass::Environment,
			InstallError::TransientNetwork { .. } => ErrorClass::TransientNetwork,
			InstallError::Integrity { .. } => ErrorClass::Integrity,
			InstallError::StateConflict(_) => ErrorClass::StateConflict,
			InstallError::Verification(_) => ErrorClass::VerificationWarning,
			InstallError::Io(_)
			| InstallError::CommandLaunch { .. }
			| InstallError::CommandFailed { .. }
			| InstallError::StepFailed { .. }
			| InstallError::Config(_)
			| InstallError::StringError(_) => ErrorClass::Fatal,
		}
	}

	pub fn network(op: impl Into<String>, reason: impl Into<String>) -> Self {
		InstallError::TransientNetwork {
			op: op.into(),
			reason: reason.into(),
		}
	}
}
