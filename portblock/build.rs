use std::path::PathBuf;

fn main() {
    let target_dir = "target/bpfel-unknown-none/release";
    let elf_path = PathBuf::from(target_dir).join("portblock-ebpf");
    println!("cargo:rustc-env=PORTBLOCK_EBPF_PATH={}", elf_path.display());
    println!("cargo:rerun-if-changed={}", elf_path.display());
}
