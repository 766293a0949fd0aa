use crate::natives::{config::DeliveryMode, utils::js_string};

/// Stub module returned for a virtual identity.
pub fn export_stub(output_name: &str, mode: DeliveryMode) -> String {
    let name = js_string(output_name);
    match mode {
        DeliveryMode::Plain => format!("export default require({name});\n"),
        DeliveryMode::Dlopen => format!(
            r#"
function get() {{
  let p = require('path').resolve(__dirname, {name});
  if (!require.cache[p]) {{
    let module = {{ exports: {{}} }};
    process.dlopen(module, p);
    require.cache[p] = module;
  }}
  // Aliased so other plugins and minifiers leave this load alone.
  let req = require || require;
  return req(p);
}}
export default get();
"#
        ),
        DeliveryMode::Esm => format!(
            r#"import {{ createRequire }} from 'module';
const require = createRequire(import.meta.url);
export default require({name});
"#
        ),
    }
}
