/// Display version information
pub fn execute() {
    println!("dealvault {}", env!("CARGO_PKG_VERSION"));
    println!("Deal negotiation bot");
}
