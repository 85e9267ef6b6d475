/// Label for a well-known TCP port, or `""` when the port is not in the table.
///
/// The table is compiled in and never changes, so probes read it freely from
/// any task.
pub fn service_name(port: u16) -> &'static str {
    match port {
        21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        110 => "POP3",
        143 => "IMAP",
        443 => "HTTPS",
        3306 => "MySQL",
        3389 => "RDP",
        8080 => "HTTP-alt",
        _ => "",
    }
}
