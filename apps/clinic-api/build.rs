fn main() {
    // Metadados de build expostos em /health
    built::write_built_file().expect("Falha ao gerar informações de build");
}
