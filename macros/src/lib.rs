use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, Ident, ItemFn, LitStr};

const USAGE: &str = "rxflow_macro::test only accepts: #[rxflow_macro::test], \
                     #[rxflow_macro::test(current)] or #[rxflow_macro::test(multi)]";

/// Test attribute for rxflow.
///
/// Sync functions become plain `#[test]`s. Async functions run on a tokio
/// runtime; `current` selects the current-thread flavor (the default) and
/// `multi` the multi-thread flavor, which is what pipelines using the
/// thread-backed schedulers want.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let input = parse_macro_input!(item as ItemFn);

  let is_async = input.sig.asyncness.is_some();

  let raw_args = proc_macro2::TokenStream::from(attr);
  let flavor = if raw_args.is_empty() {
    None
  } else {
    if !is_async {
      return TokenStream::from(
        syn::Error::new(
          raw_args.span(),
          "rxflow_macro::test flavor args are only supported for async tests. Use \
           #[rxflow_macro::test] for sync tests, or make the function async.",
        )
        .to_compile_error(),
      );
    }

    let (name, span) = if let Ok(ident) = syn::parse2::<Ident>(raw_args.clone()) {
      (ident.to_string(), ident.span())
    } else if let Ok(lit) = syn::parse2::<LitStr>(raw_args.clone()) {
      (lit.value(), lit.span())
    } else {
      return TokenStream::from(syn::Error::new(raw_args.span(), USAGE).to_compile_error());
    };

    match name.as_str() {
      "current" => Some(quote!(flavor = "current_thread")),
      "multi" => Some(quote!(flavor = "multi_thread", worker_threads = 2)),
      _ => return TokenStream::from(syn::Error::new(span, USAGE).to_compile_error()),
    }
  };

  let attr = match (is_async, flavor) {
    (false, _) => quote!(#[test]),
    (true, None) => quote!(#[tokio::test]),
    (true, Some(flavor)) => quote!(#[tokio::test(#flavor)]),
  };

  let expanded = quote! {
      #attr
      #input
  };

  TokenStream::from(expanded)
}
