fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Prefer an explicitly configured protoc, fall back to the vendored binary.
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()
            .map_err(|e| format!("vendored protoc unavailable: {e:?}"))?;
        std::env::set_var("PROTOC", protoc);
    }

    println!("cargo:rerun-if-changed=proto/grpc_predict_v2.proto");
    tonic_build::compile_protos("proto/grpc_predict_v2.proto")?;
    Ok(())
}
