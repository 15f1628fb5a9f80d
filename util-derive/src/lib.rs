use proc_macro::TokenStream;
use quote::quote;

fn get_enum_variants(
    input: &syn::DeriveInput,
) -> &syn::punctuated::Punctuated<syn::Variant, syn::token::Comma> {
    let variants = match &input.data {
        syn::Data::Enum(enum_item) => &enum_item.variants,
        _ => panic!("Input must be an enum."),
    };

    assert!(
        variants.iter().all(|v| v.fields.is_empty()),
        "All variants must have no fields."
    );

    variants
}

/// Derives `util::EnumFromStr`.
///
/// The generated `from_str` uppercases its input and matches it against the
/// uppercased variant names. Additional spellings can be declared per
/// variant with `#[from_str(alias = "...")]`; an attribute may carry several
/// aliases.
#[proc_macro_derive(EnumFromStr, attributes(from_str))]
pub fn enum_from_str_derive(input: TokenStream) -> TokenStream {
    let syn_item: syn::DeriveInput = syn::parse(input).unwrap();
    let name = &syn_item.ident;
    let name_str = name.to_string();
    let variants = get_enum_variants(&syn_item);

    let mut arms = Vec::new();
    for variant in variants {
        let ident = &variant.ident;
        let literal = ident.to_string().to_uppercase();
        arms.push(quote! { #literal => Ok(#name::#ident), });

        for attr in &variant.attrs {
            if !attr.path().is_ident("from_str") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("alias") {
                    let lit: syn::LitStr = meta.value()?.parse()?;
                    let alias = lit.value().to_uppercase();
                    arms.push(quote! { #alias => Ok(#name::#ident), });
                    Ok(())
                } else {
                    Err(meta.error("expected `alias = \"...\"`"))
                }
            })
            .expect("malformed #[from_str(...)] attribute");
        }
    }

    let expanded = quote! {
        impl EnumFromStr for #name {
            fn from_str(s: &str) -> Result<#name, ::util::ParseEnumError> {
                match s.to_ascii_uppercase().as_str() {
                    #(#arms)*
                    _ => Err(::util::ParseEnumError {
                        value: s.to_string(),
                        enum_name: #name_str,
                    }),
                }
            }
        }
    };
    expanded.into()
}
