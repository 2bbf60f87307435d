//! Typed bindings for a contract.
//!
//! [`render_bindings`] turns one descriptor into serde-derived Rust types: a
//! struct per object section (params, query, headers, body, response headers)
//! and one per declared response status. Nested objects get their own struct,
//! unions become untagged enums, string enums become plain enums.

use std::collections::BTreeSet;

use heck::{ToSnakeCase, ToUpperCamelCase};
use proc_macro2::{Ident, Span, TokenStream};
use quote::{format_ident, quote};

use crate::contract::ContractDescriptor;
use crate::schema::{Literal, ObjectSchema, Schema};

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut",
    "pub", "ref", "return", "static", "struct", "trait", "true", "type", "unsafe", "use",
    "where", "while", "box", "yield", "gen",
];

/// Render Rust source with the types of every declared section.
pub fn render_bindings(descriptor: &ContractDescriptor) -> String {
    let base = type_name(&descriptor.name);
    let mut gen = Generator::default();

    let sections = [
        ("Params", &descriptor.params),
        ("Query", &descriptor.query),
        ("Headers", &descriptor.request_headers),
        ("Body", &descriptor.body),
        ("ResponseHeaders", &descriptor.response_headers),
    ];
    for (suffix, section) in sections {
        if let Some(schema) = section {
            gen.root(&format!("{base}{suffix}"), schema);
        }
    }
    for (status, schema) in &descriptor.responses {
        gen.root(&format!("{base}Response{status}"), schema);
    }

    let items = gen.items;
    let tokens = quote! { #(#items)* };
    format!(
        "// Bindings for contract `{}`. Regenerate instead of editing.\n{}\n",
        descriptor.name, tokens
    )
}

#[derive(Default)]
struct Generator {
    items: Vec<TokenStream>,
    names: BTreeSet<String>,
}

impl Generator {
    fn root(&mut self, name: &str, schema: &Schema) {
        match schema {
            Schema::Object(obj) => {
                self.object(name, obj);
            }
            other => {
                let name = self.claim(name);
                let ident = format_ident!("{}", name);
                let ty = self.type_of(&name, other);
                self.items.push(quote! { pub type #ident = #ty; });
            }
        }
    }

    /// Reserve a unique type name.
    fn claim(&mut self, wanted: &str) -> String {
        unique(&mut self.names, wanted)
    }

    fn object(&mut self, name: &str, obj: &ObjectSchema) -> TokenStream {
        let name = self.claim(name);
        let ident = format_ident!("{}", name);

        let mut fields = Vec::new();
        for (key, schema) in &obj.properties {
            let field = field_ident(key);
            let hint = format!("{name}{}", key.to_upper_camel_case());
            let rename = (field.to_string().trim_start_matches("r#") != key.as_str())
                .then(|| quote! { #[serde(rename = #key)] });

            let tokens = match schema {
                Schema::Optional(inner) => {
                    let ty = self.type_of(&hint, inner);
                    quote! {
                        #rename
                        #[serde(default, skip_serializing_if = "Option::is_none")]
                        pub #field: Option<#ty>,
                    }
                }
                other => {
                    let ty = self.type_of(&hint, other);
                    quote! {
                        #rename
                        pub #field: #ty,
                    }
                }
            };
            fields.push(tokens);
        }

        let deny = obj
            .strict
            .then(|| quote! { #[serde(deny_unknown_fields)] });
        self.items.push(quote! {
            #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
            #deny
            pub struct #ident {
                #(#fields)*
            }
        });
        quote! { #ident }
    }

    fn type_of(&mut self, hint: &str, schema: &Schema) -> TokenStream {
        match schema {
            Schema::Any | Schema::Unknown | Schema::Function { .. } => quote! { serde_json::Value },
            Schema::Null => quote! { () },
            Schema::String => quote! { String },
            Schema::Number => quote! { f64 },
            Schema::Integer => quote! { i64 },
            Schema::BigInt => quote! { i128 },
            Schema::Boolean => quote! { bool },
            Schema::Date => quote! { chrono::DateTime<chrono::Utc> },
            Schema::Literal(lit) => literal_type(lit),
            Schema::Enum(values) => self.enumeration(hint, values),
            Schema::Array(items) => {
                let inner = self.type_of(&format!("{hint}Item"), items);
                quote! { Vec<#inner> }
            }
            Schema::Record(values) => {
                let inner = self.type_of(&format!("{hint}Value"), values);
                quote! { std::collections::BTreeMap<String, #inner> }
            }
            Schema::Object(obj) => self.object(hint, obj),
            Schema::Optional(inner) => {
                let inner = self.type_of(hint, inner);
                quote! { Option<#inner> }
            }
            Schema::Promise(inner) => self.type_of(hint, inner),
            Schema::Union(members) => self.union(hint, members),
        }
    }

    fn enumeration(&mut self, hint: &str, values: &[Literal]) -> TokenStream {
        let strings: Option<Vec<&str>> = values
            .iter()
            .map(|v| match v {
                Literal::String(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        let Some(strings) = strings else {
            return quote! { serde_json::Value };
        };

        let name = self.claim(hint);
        let ident = format_ident!("{}", name);
        let mut taken = BTreeSet::new();
        let variants: Vec<TokenStream> = strings
            .iter()
            .map(|s| {
                let variant = format_ident!("{}", unique(&mut taken, &variant_name(s)));
                quote! {
                    #[serde(rename = #s)]
                    #variant,
                }
            })
            .collect();
        self.items.push(quote! {
            #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
            pub enum #ident {
                #(#variants)*
            }
        });
        quote! { #ident }
    }

    fn union(&mut self, hint: &str, members: &[Schema]) -> TokenStream {
        let name = self.claim(hint);
        let ident = format_ident!("{}", name);
        let variants: Vec<TokenStream> = members
            .iter()
            .enumerate()
            .map(|(i, member)| {
                let variant = format_ident!("Variant{}", i);
                let ty = self.type_of(&format!("{name}Variant{i}"), member);
                quote! { #variant(#ty), }
            })
            .collect();
        self.items.push(quote! {
            #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
            #[serde(untagged)]
            pub enum #ident {
                #(#variants)*
            }
        });
        quote! { #ident }
    }
}

fn literal_type(lit: &Literal) -> TokenStream {
    match lit {
        Literal::String(_) => quote! { String },
        Literal::Number(_) => quote! { f64 },
        Literal::Bool(_) => quote! { bool },
    }
}

fn field_ident(key: &str) -> Ident {
    let mut snake = key.to_snake_case();
    if snake.is_empty() {
        snake = "field".to_string();
    }
    if snake.starts_with(|c: char| c.is_ascii_digit()) {
        snake = format!("_{snake}");
    }
    match snake.as_str() {
        "self" | "super" | "crate" | "Self" => format_ident!("{}_", snake),
        s if KEYWORDS.contains(&s) => Ident::new_raw(s, Span::call_site()),
        _ => format_ident!("{}", snake),
    }
}

fn unique(names: &mut BTreeSet<String>, wanted: &str) -> String {
    let mut name = wanted.to_string();
    let mut n = 2;
    while !names.insert(name.clone()) {
        name = format!("{wanted}{n}");
        n += 1;
    }
    name
}

/// Contract names become type prefixes; `2faVerify` → `C2faVerify`.
fn type_name(contract: &str) -> String {
    let camel = contract.to_upper_camel_case();
    if camel.is_empty() || camel.starts_with(|c: char| c.is_ascii_digit()) {
        format!("C{camel}")
    } else {
        camel
    }
}

fn variant_name(value: &str) -> String {
    let camel = value.to_upper_camel_case();
    if camel.is_empty() || camel.starts_with(|c: char| c.is_ascii_digit()) {
        format!("V{camel}")
    } else {
        camel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{array, date, enum_, number, optional, string, union};

    fn compact(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn renders_one_struct_per_section_and_status() {
        let d = ContractDescriptor::new("getInvoice")
            .params(crate::shape! { id: string() })
            .query(crate::shape! { note: optional(string()) })
            .response(200, crate::shape! { id: string(), amount: number(), issued: date() });
        let out = compact(&render_bindings(&d));
        assert!(out.contains("pubstructGetInvoiceParams{pubid:String,}"));
        assert!(out.contains("pubnote:Option<String>"));
        assert!(out.contains("pubstructGetInvoiceResponse200"));
        assert!(out.contains("pubissued:chrono::DateTime<chrono::Utc>"));
        // Implicit error statuses are not declared, so no types for them.
        assert!(!out.contains("GetInvoiceResponse400"));
    }

    #[test]
    fn keys_are_renamed_and_keywords_escaped() {
        let d = ContractDescriptor::new("pay").request_headers(crate::shape! {
            "x-tenant": string(),
            "type": string(),
        });
        let out = compact(&render_bindings(&d));
        assert!(out.contains("#[serde(rename=\"x-tenant\")]pubx_tenant:String"));
        assert!(out.contains("pubr#type:String"));
    }

    #[test]
    fn nested_objects_enums_and_unions_get_their_own_types() {
        let d = ContractDescriptor::new("checkout").body(crate::shape! {
            lines: array(crate::shape! { sku: string() }),
            status: enum_(["open", "paid"]),
            amount: union([number(), string()]),
        });
        let out = compact(&render_bindings(&d));
        assert!(out.contains("pubstructCheckoutBodyLinesItem{pubsku:String,}"));
        assert!(out.contains("pubenumCheckoutBodyStatus{#[serde(rename=\"open\")]Open,"));
        assert!(out.contains("#[serde(untagged)]pubenumCheckoutBodyAmount{Variant0(f64),Variant1(String),}"));
        assert!(out.contains("publines:Vec<CheckoutBodyLinesItem>"));
    }

    #[test]
    fn contract_names_starting_with_digits_are_prefixed() {
        let d = ContractDescriptor::new("2faVerify").body(crate::shape! { code: string() });
        let out = compact(&render_bindings(&d));
        assert!(out.contains("pubstructC2faVerifyBody{pubcode:String,}"));
    }

    #[test]
    fn enum_values_differing_by_case_get_distinct_variants() {
        let d = ContractDescriptor::new("filter").query(crate::shape! {
            status: enum_(["open", "Open"]),
        });
        let out = compact(&render_bindings(&d));
        assert!(out.contains("#[serde(rename=\"open\")]Open,#[serde(rename=\"Open\")]Open2,"));
    }
}
