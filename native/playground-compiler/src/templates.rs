//! Built-in file contents for a fresh project.

/// Hidden entry component that installs the component library and renders the app.
pub const MAIN_CODE: &str = r#"<script setup>
import App from './App.vue'
import { setupOpenTiny } from './opentiny.js'

setupOpenTiny()
</script>

<template>
  <App />
</template>
"#;

pub const WELCOME_CODE: &str = r#"<script setup lang="ts">
import { ref } from 'vue'
import { TinyButton } from '@opentiny/vue'

const msg = ref('Hello OpenTiny!')
const count = ref(0)
</script>

<template>
  <h1>{{ msg }}</h1>
  <tiny-button type="primary" @click="count++">Clicked {{ count }} times</tiny-button>
</template>
"#;

const OPENTINY_CODE: &str = r#"import { getCurrentInstance } from 'vue'
import TinyVue from '@opentiny/vue'

let installed = false
await loadStyle()

export function setupOpenTiny() {
  if (installed) return
  const instance = getCurrentInstance()
  instance.appContext.app.use(TinyVue)
  installed = true
}

export function loadStyle() {
  return new Promise((resolve, reject) => {
    const link = document.createElement('link')
    link.rel = 'stylesheet'
    link.href = '#STYLE#'
    link.addEventListener('load', resolve)
    link.addEventListener('error', reject)
    document.body.append(link)
  })
}
"#;

pub const TSCONFIG_CODE: &str = r#"{
  "compilerOptions": {
    "allowJs": true,
    "checkJs": true,
    "jsx": "preserve",
    "target": "ESNext",
    "module": "ESNext",
    "moduleResolution": "Bundler",
    "allowImportingTsExtensions": true
  },
  "vueCompilerOptions": {
    "target": 3.4
  }
}
"#;

pub const EMPTY_IMPORT_MAP: &str = "{\n  \"imports\": {}\n}";

const STYLE_PLACEHOLDER: &str = "#STYLE#";

/// Component-library bootstrap loading the theme stylesheet from `style_url`.
pub fn opentiny_code(style_url: &str) -> String {
    OPENTINY_CODE.replace(STYLE_PLACEHOLDER, style_url).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opentiny_code_injects_style() {
        let code = opentiny_code("https://cdn.test/theme.css");
        assert!(code.contains("link.href = 'https://cdn.test/theme.css'"));
        assert!(!code.contains(STYLE_PLACEHOLDER));
    }

    #[test]
    fn test_default_files_are_json() {
        assert!(serde_json::from_str::<serde_json::Value>(TSCONFIG_CODE).is_ok());
        assert!(serde_json::from_str::<serde_json::Value>(EMPTY_IMPORT_MAP).is_ok());
    }
}
