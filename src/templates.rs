use tera::Tera;

macro_rules! template {
    ($name:literal) => {
        (
            $name,
            include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/", $name)),
        )
    };
}

/// All templates are compiled into the binary. Names end in `.html` so
/// tera autoescapes every interpolated value.
pub fn load() -> tera::Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        template!("email/layout.html"),
        template!("email/signup.html"),
        template!("email/reset.html"),
        template!("email/invite.html"),
        template!("site/base.html"),
        template!("site/oneria.html"),
        template!("site/zeno.html"),
    ])?;
    Ok(tera)
}
