//! A plain stdin/stdout confirmation prompt: the scriptable stand-in for a
//! real interactive UI's approval surface.

use std::io::Write as _;

use async_trait::async_trait;
use tau_core::approval::ApprovalDeniedReason;
use tau_core::approval::ApprovalRequest;
use tau_core::approval::ApprovalResult;
use tau_core::approval::ApprovalUi;

pub struct TerminalApprovalUi;

#[async_trait]
impl ApprovalUi for TerminalApprovalUi {
    async fn prompt(&self, request: ApprovalRequest) -> ApprovalResult {
        eprintln!("\n{}", request.title);
        eprintln!("{}", request.body);
        eprint!("Allow? [y/N/a=always this session] ");
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return ApprovalResult::Denied { reason: ApprovalDeniedReason::Headless };
        }

        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => ApprovalResult::Approved { run_unsandboxed: false },
            "a" | "always" => ApprovalResult::ApprovedForSession { run_unsandboxed: false },
            _ => ApprovalResult::Denied { reason: ApprovalDeniedReason::Declined },
        }
    }
}
