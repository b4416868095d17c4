use std::io::{Error, ErrorKind, Result};

fn main() -> Result<()> {
    let proto_files = &["../proto/fleetwatch.proto"];
    let includes = &["../proto"];

    // Use the vendored protoc unless the environment provides one
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()
            .map_err(|e| Error::new(ErrorKind::NotFound, e.to_string()))?;
        std::env::set_var("PROTOC", protoc);
    }

    prost_build::compile_protos(proto_files, includes)?;

    // Recompile if the proto file changes
    for proto in proto_files {
        println!("cargo:rerun-if-changed={}", proto);
    }

    Ok(())
}
