use portscope::ports::parse_port_range;
use portscope::types::ScanRequest;

#[test]
fn parsed_range_builds_valid_request() {
    let (start, end) = parse_port_range("20-85").expect("parse ok");
    let req = ScanRequest::new("127.0.0.1", u32::from(start), u32::from(end));
    let range = req.validate().expect("valid request");
    assert_eq!(range.count(), 66);
}

#[test]
fn invalid_port_rejected() {
    assert!(parse_port_range("0").is_err());
    assert!(parse_port_range("1-65536").is_err());
}
