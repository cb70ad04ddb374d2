//! Procedural macros for the denorm project.
//!
//! `#[derive(Trackable)]` generates the static field schema that change tracking
//! compares records with. The schema follows the struct's serde attributes, so the
//! keys it lists are the keys the record serializes to.
//!
//! Field attributes:
//!
//! - `#[track(nested)]` compares the field's own fields under the field's key. The
//!   field type (or the `T` of an `Option<T>`) must implement `Trackable`.
//! - `#[track(skip)]` leaves the field out of change detection.
//! - `#[track(tracker)]` marks the record's `ChangeTracker`. The field is left out of
//!   the schema and `Tracked` is implemented on top of `Trackable`.
//!
//! Serde's `rename`, `rename_all`, `skip`, `skip_serializing` and `flatten` are
//! honoured. A `#[serde(flatten)]` field must also be marked `#[track(nested)]`, which
//! compares its fields at the parent's level, or `#[track(skip)]`.

#[allow(unused_extern_crates)]
extern crate self as denorm_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, Fields, GenericArgument, Ident, LitStr,
    PathArguments, Type, meta::ParseNestedMeta, spanned::Spanned,
};

#[proc_macro_derive(Trackable, attributes(track))]
pub fn derive_trackable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_trackable(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_trackable(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "Trackable cannot be derived for generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new(
                    input.ident.span(),
                    "Trackable can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                input.ident.span(),
                "Trackable can only be derived for structs",
            ));
        }
    };

    let rename_all = container_rename_rule(input)?;

    let mut descriptors = Vec::new();
    let mut tracker: Option<&Ident> = None;

    for field in fields {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))?;
        let attrs = FieldAttrs::parse(field)?;

        if attrs.tracker {
            if tracker.is_some() {
                return Err(syn::Error::new(ident.span(), "only one field can be #[track(tracker)]"));
            }
            tracker = Some(ident);
            continue;
        }

        if attrs.skip {
            continue;
        }

        let key = attrs
            .rename
            .unwrap_or_else(|| rename_all.apply(&ident.to_string()));

        if attrs.flatten && !attrs.nested {
            return Err(syn::Error::new(
                ident.span(),
                "a flattened field needs #[track(nested)] or #[track(skip)]",
            ));
        }

        let descriptor = if attrs.flatten {
            let ty = peel_option(&field.ty);
            quote! {
                ::denorm::tracking::FieldDescriptor::flatten(
                    #key,
                    <#ty as ::denorm::tracking::Trackable>::schema,
                )
            }
        } else if attrs.nested {
            let ty = peel_option(&field.ty);
            quote! {
                ::denorm::tracking::FieldDescriptor::nested(
                    #key,
                    <#ty as ::denorm::tracking::Trackable>::schema,
                )
            }
        } else {
            quote! { ::denorm::tracking::FieldDescriptor::leaf(#key) }
        };

        descriptors.push(descriptor);
    }

    let name = &input.ident;

    let tracked = tracker.map(|field| {
        quote! {
            impl ::denorm::tracking::Tracked for #name {
                fn tracker(&self) -> &::denorm::tracking::ChangeTracker<Self> {
                    &self.#field
                }

                fn tracker_mut(&mut self) -> &mut ::denorm::tracking::ChangeTracker<Self> {
                    &mut self.#field
                }
            }
        }
    });

    Ok(quote! {
        impl ::denorm::tracking::Trackable for #name {
            fn schema() -> &'static [::denorm::tracking::FieldDescriptor] {
                const SCHEMA: &[::denorm::tracking::FieldDescriptor] = &[
                    #(#descriptors),*
                ];
                SCHEMA
            }
        }

        #tracked
    })
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    skip: bool,
    flatten: bool,
    nested: bool,
    tracker: bool,
}

impl FieldAttrs {
    fn parse(field: &syn::Field) -> syn::Result<Self> {
        let mut attrs = Self::default();

        for attr in &field.attrs {
            if attr.path().is_ident("track") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("nested") {
                        attrs.nested = true;
                    } else if meta.path.is_ident("skip") {
                        attrs.skip = true;
                    } else if meta.path.is_ident("tracker") {
                        attrs.tracker = true;
                    } else {
                        return Err(meta.error("expected `nested`, `skip` or `tracker`"));
                    }
                    Ok(())
                })?;
            } else if attr.path().is_ident("serde") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename") {
                        if let Some(name) = serialize_name(&meta)? {
                            attrs.rename = Some(name);
                        }
                    } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                        attrs.skip = true;
                    } else if meta.path.is_ident("flatten") {
                        attrs.flatten = true;
                    } else {
                        skip_meta_value(&meta)?;
                    }
                    Ok(())
                })?;
            }
        }

        Ok(attrs)
    }
}

/// Reads `#[serde(rename_all = "...")]` from the container.
fn container_rename_rule(input: &DeriveInput) -> syn::Result<RenameRule> {
    let mut rule = RenameRule::None;

    for attr in &input.attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                if let Some(name) = serialize_name(&meta)? {
                    rule = RenameRule::from_str(&name)
                        .ok_or_else(|| meta.error(format!("unknown rename rule `{}`", name)))?;
                }
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        })?;
    }

    Ok(rule)
}

/// Accepts both `rename = "x"` and `rename(serialize = "x", ...)`.
fn serialize_name(meta: &ParseNestedMeta) -> syn::Result<Option<String>> {
    if meta.input.peek(syn::Token![=]) {
        let value: LitStr = meta.value()?.parse()?;
        return Ok(Some(value.value()));
    }

    let mut name = None;
    meta.parse_nested_meta(|inner| {
        let value: LitStr = inner.value()?.parse()?;
        if inner.path.is_ident("serialize") {
            name = Some(value.value());
        }
        Ok(())
    })?;

    Ok(name)
}

/// Consumes the value of a serde attribute that does not affect the schema.
fn skip_meta_value(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        content.parse::<TokenStream2>()?;
    }
    Ok(())
}

/// Returns `T` for `Option<T>`, or the type unchanged.
fn peel_option(ty: &Type) -> &Type {
    if let Type::Path(path) = ty
        && path.qself.is_none()
        && let Some(segment) = path.path.segments.last()
        && segment.ident == "Option"
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && let Some(GenericArgument::Type(inner)) = args.args.first()
    {
        return inner;
    }

    ty
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum RenameRule {
    None,
    LowerCase,
    UpperCase,
    PascalCase,
    CamelCase,
    SnakeCase,
    ScreamingSnakeCase,
    KebabCase,
    ScreamingKebabCase,
}

impl RenameRule {
    fn from_str(rule: &str) -> Option<Self> {
        Some(match rule {
            "lowercase" => Self::LowerCase,
            "UPPERCASE" => Self::UpperCase,
            "PascalCase" => Self::PascalCase,
            "camelCase" => Self::CamelCase,
            "snake_case" => Self::SnakeCase,
            "SCREAMING_SNAKE_CASE" => Self::ScreamingSnakeCase,
            "kebab-case" => Self::KebabCase,
            "SCREAMING-KEBAB-CASE" => Self::ScreamingKebabCase,
            _ => return None,
        })
    }

    /// Renames a snake_case field the way serde does.
    fn apply(self, field: &str) -> String {
        let field = field.strip_prefix("r#").unwrap_or(field);

        match self {
            Self::None | Self::LowerCase | Self::SnakeCase => field.to_string(),
            Self::UpperCase | Self::ScreamingSnakeCase => field.to_ascii_uppercase(),
            Self::PascalCase => {
                let mut pascal = String::new();
                let mut capitalize = true;
                for ch in field.chars() {
                    if ch == '_' {
                        capitalize = true;
                    } else if capitalize {
                        pascal.push(ch.to_ascii_uppercase());
                        capitalize = false;
                    } else {
                        pascal.push(ch);
                    }
                }
                pascal
            }
            Self::CamelCase => {
                let pascal = Self::PascalCase.apply(field);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => pascal,
                }
            }
            Self::KebabCase => field.replace('_', "-"),
            Self::ScreamingKebabCase => field.to_ascii_uppercase().replace('_', "-"),
        }
    }
}
