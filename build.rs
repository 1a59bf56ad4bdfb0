use std::env;

fn main() {
    println!("cargo:rustc-check-cfg=cfg(register_scan)");
    // The register-scanning frame-recovery strategy only knows the x86-64
    // general purpose register set. Gate it here rather than scattering
    // arch checks through frame_recovery.rs.
    if env::var("CARGO_CFG_TARGET_ARCH").unwrap() == "x86_64" {
        println!("cargo:rustc-cfg=register_scan");
    }
}
