//! Server-rendered pages. The dashboards load their data from the JSON API.

use crate::models::SiteContentBundle;
use std::fmt::Write;

const SITEMAP_PATHS: [&str; 4] = ["", "/login", "/legal/terminos", "/legal/privacidad"];

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"es\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{} | Caro Consulting</title>\n</head>\n<body>\n\
         <nav><a href=\"/\">Caro Consulting</a> <a href=\"/#servicios\">Servicios</a> \
         <a href=\"/#casos\">Casos de Éxito</a> <a href=\"/login\">Acceso Clientes</a> \
         <a href=\"/agendar\">Agendar</a></nav>\n<main>\n{}\n</main>\n\
         <footer><a href=\"/legal/terminos\">Términos</a> <a href=\"/legal/privacidad\">Privacidad</a></footer>\n\
         </body>\n</html>\n",
        escape_html(title),
        body
    )
}

/// Home page. Hero title and subtitle carry editor-authored markup and are
/// emitted as-is; every other field is escaped.
pub fn home(content: &SiteContentBundle) -> String {
    let mut body = String::new();
    let hero = &content.hero;
    let _ = write!(
        body,
        "<section id=\"hero\"><p>{}</p><h1>{}</h1><p>{}</p>\
         <a href=\"/agendar\">{}</a> <a href=\"#casos\">{}</a></section>\n",
        escape_html(&hero.tagline),
        hero.title,
        hero.subtitle,
        escape_html(&hero.cta_primary),
        escape_html(&hero.cta_secondary)
    );

    body.push_str("<section id=\"servicios\">\n");
    for service in &content.services {
        let items: String = service
            .items
            .iter()
            .map(|item| format!("<li>{}</li>", escape_html(item)))
            .collect();
        let _ = writeln!(
            body,
            "<article data-icon=\"{}\"><h3>{}</h3><p>{}</p><ul>{}</ul></article>",
            escape_html(&service.icon),
            escape_html(&service.title),
            escape_html(&service.description),
            items
        );
    }
    body.push_str("</section>\n<section id=\"casos\">\n");
    for case in &content.cases {
        let _ = writeln!(
            body,
            "<article><h3>{}</h3><p>{}</p><dl><dt>{}</dt><dd>{}</dd><dt>{}</dt><dd>{}</dd></dl></article>",
            escape_html(&case.title),
            escape_html(&case.description),
            escape_html(&case.metric_label),
            escape_html(&case.metric_value),
            escape_html(&case.time_label),
            escape_html(&case.time_value)
        );
    }

    let bio = &content.bio;
    let _ = write!(
        body,
        "</section>\n<section id=\"nosotros\"><span>{}</span><h3>{}</h3><p>{}</p><p>{}</p>\
         <a href=\"{}\">LinkedIn</a> <a href=\"mailto:{}\">{}</a></section>",
        escape_html(&bio.initials),
        escape_html(&bio.name),
        escape_html(&bio.role),
        escape_html(&bio.description),
        escape_html(&bio.linkedin),
        escape_html(&bio.email),
        escape_html(&bio.email)
    );
    layout("Consultoría Industrial B2B", &body)
}

pub fn schedule(calendar_url: &str) -> String {
    layout(
        "Agendar",
        &format!(
            "<h1>Agenda una reunión</h1>\n<iframe src=\"{}\" width=\"100%\" height=\"700\" frameborder=\"0\" title=\"Agenda\"></iframe>",
            escape_html(calendar_url)
        ),
    )
}

pub fn terms() -> String {
    layout(
        "Términos y Condiciones",
        "<h1>Términos y Condiciones</h1>\n\
         <h2>1. Introducción</h2><p>Al acceder a la plataforma de Caro Consulting usted acepta estos términos.</p>\n\
         <h2>2. Servicios de Consultoría</h2><p>Los servicios se prestan según la modalidad contratada por cada cliente.</p>\n\
         <h2>3. Uso de la Plataforma</h2><p>El acceso al portal es personal y las credenciales no deben compartirse.</p>\n\
         <h2>4. Propiedad Intelectual</h2><p>Los entregables y metodologías son propiedad de Caro Consulting salvo acuerdo en contrario.</p>",
    )
}

pub fn privacy() -> String {
    layout(
        "Política de Privacidad",
        "<h1>Política de Privacidad y Seguridad</h1>\n\
         <h2>Confidencialidad de Datos</h2><p>La información financiera compartida se trata como estrictamente confidencial.</p>\n\
         <h2>Seguridad de Infraestructura</h2><p>Cada cliente accede únicamente a los datos de su propia empresa.</p>\n\
         <h2>Uso de Información</h2><p>Los datos se utilizan solo para la prestación de los servicios contratados.</p>",
    )
}

pub fn intake_forms() -> String {
    layout(
        "Centro de Datos",
        "<h1>Centro de Datos</h1>\n\
         <form method=\"post\" action=\"/api/forms\" enctype=\"multipart/form-data\">\n\
         <select name=\"formType\"><option value=\"INICIAL\">Diagnóstico Inicial</option>\
         <option value=\"PRICING\">Cuestionario de Pricing</option></select>\n\
         <input name=\"empresa\" placeholder=\"Empresa\"> <input name=\"website\" placeholder=\"Sitio web\">\n\
         <input name=\"industria\" placeholder=\"Industria\"> <input name=\"facturacion\" placeholder=\"Facturación anual\">\n\
         <textarea name=\"desafio\" placeholder=\"Principal desafío\"></textarea>\n\
         <input type=\"file\" name=\"files\" multiple>\n<button type=\"submit\">Enviar</button>\n</form>",
    )
}

pub fn login() -> String {
    layout(
        "Acceso Clientes",
        "<h2>Bienvenido</h2>\n<form id=\"login\"><input type=\"email\" name=\"email\" placeholder=\"Email\">\
         <input type=\"password\" name=\"password\" placeholder=\"Contraseña\"><button type=\"submit\">Ingresar</button></form>",
    )
}

pub fn dashboard_shell() -> String {
    layout(
        "Dashboard",
        "<div id=\"dashboard\" data-api=\"/api/dashboard\">\
         <button data-tab=\"overview\">Dashboard</button><button data-tab=\"documents\">Documentos</button>\
         <button data-tab=\"projects\">Proyectos</button><button data-tab=\"contracts\">Contratos</button>\
         <button data-action=\"logout\">Cerrar Sesión</button></div>",
    )
}

pub fn admin_shell() -> String {
    layout(
        "Panel de Administración",
        "<div id=\"admin\" data-api=\"/api/admin\">\
         <button data-tab=\"clients\">Clientes</button><button data-tab=\"timeline\">Proyectos</button>\
         <button data-tab=\"content\">Editor de Contenido</button><button data-tab=\"forms\">Formularios</button></div>",
    )
}

pub fn robots(site_url: &str) -> String {
    format!(
        "User-Agent: *\nAllow: /\nDisallow: /admin/\nDisallow: /dashboard/\nDisallow: /private/\n\nSitemap: {}/sitemap.xml\n",
        site_url.trim_end_matches('/')
    )
}

pub fn sitemap(site_url: &str, last_modified: chrono::NaiveDate) -> String {
    let base = site_url.trim_end_matches('/');
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for (path, (frequency, priority)) in SITEMAP_PATHS
        .iter()
        .zip([("monthly", "1"), ("yearly", "0.5"), ("yearly", "0.3"), ("yearly", "0.3")])
    {
        let _ = writeln!(
            xml,
            "<url>\n<loc>{}{}</loc>\n<lastmod>{}</lastmod>\n<changefreq>{}</changefreq>\n<priority>{}</priority>\n</url>",
            escape_html(base),
            path,
            last_modified.format("%Y-%m-%d"),
            frequency,
            priority
        );
    }
    xml.push_str("</urlset>\n");
    xml
}
