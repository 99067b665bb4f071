//! Generates Swift and Kotlin bindings for `tallykit`.

fn main() {
    uniffi::uniffi_bindgen_main();
}
