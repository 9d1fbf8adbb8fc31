use crate::models::env::{ProbeConfig, DEFAULT_FLIGHT_PORT};
use crate::models::report::{ProbeReport, ProbeStep};

/// Remediation checklist printed when no method worked
pub fn recommendations(config: &ProbeConfig, report: &ProbeReport) -> Vec<String> {
    let mut items = vec![];
    if config.port == DEFAULT_FLIGHT_PORT {
        items.push(format!(
            "Verify the port number is correct for Arrow Flight ({} is the usual default)",
            DEFAULT_FLIGHT_PORT
        ));
    } else {
        items.push(format!(
            "Verify the port number is correct for Arrow Flight (typically {}, not {})",
            DEFAULT_FLIGHT_PORT, config.port
        ));
    }
    items.push("Check if SSL/TLS is properly configured on the server".to_owned());
    match &report.socket {
        Some(socket) if !socket.open => items.push(
            "Verify network connectivity and firewall rules (the port did not accept a TCP connection)"
                .to_owned(),
        ),
        _ => items.push("Verify network connectivity and firewall rules".to_owned()),
    }
    items.push("Confirm the Dremio Flight service is enabled on the server".to_owned());
    items.push("Check Dremio server logs for more specific error information".to_owned());
    if rejected_credentials(report) {
        items.push(format!(
            "Check the {} credentials: the server rejected them",
            config.credentials.scheme_name()
        ));
    }
    items
}

fn rejected_credentials(report: &ProbeReport) -> bool {
    report.methods.iter().any(|method| {
        [&method.list_flights, &method.flight_info, &method.query]
            .iter()
            .any(|step| match step {
                ProbeStep::Failed(reason) => {
                    reason.starts_with("Unauthenticated") || reason.starts_with("PermissionDenied")
                }
                _ => false,
            })
    })
}
