use anyhow::Result;

/// Prints the configuration fingerprint for a request.
pub fn run(file_id: &str, build_plate: &str, plate: Option<u32>, mappings: &[String]) -> Result<()> {
    let request = super::build_request(file_id, build_plate, plate, mappings)?;
    println!("{}", request.fingerprint());
    Ok(())
}
