//! Server-rendered pages.

use crate::flash::Flash;
use axum::http::StatusCode;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use riskscan_core::highlight::{category_color, css_class};
use riskscan_core::pipeline::{AnalysisView, HistoryRow, Overview};
use riskscan_core::settings::Settings;
use std::fmt::Write;

const STYLE: &str = r#"<style>
  body { font-family: system-ui, Arial, sans-serif; margin: 0; color: #1f2933; background: #f5f7fa; }
  nav { background: #3e4c59; padding: 12px 24px; }
  nav a { color: #fff; margin-right: 16px; text-decoration: none; }
  main { max-width: 1100px; margin: 24px auto; padding: 0 16px; }
  .card { background: #fff; border-radius: 8px; padding: 16px; margin-bottom: 16px; box-shadow: 0 1px 2px rgba(0,0,0,.08); }
  .notice { padding: 10px 14px; border-radius: 6px; margin-bottom: 16px; }
  .notice-success { background: #e3f9e5; }
  .notice-warning { background: #fffbea; }
  .notice-danger { background: #ffe3e3; }
  table { width: 100%; border-collapse: collapse; }
  th, td { text-align: left; padding: 6px 8px; border-bottom: 1px solid #e4e7eb; }
  .pill { display: inline-block; padding: 2px 8px; border-radius: 999px; font-size: 12px; }
  .muted { color: #7b8794; font-size: 13px; }
  .preview-text { white-space: pre-wrap; font-family: inherit; line-height: 1.5; }
  .highlight { border-radius: 3px; padding: 0 1px; }
  .hit { border-left: 3px solid #cbd2d9; padding: 8px 12px; margin: 8px 0; }
  .category-intro { background: rgba(103, 126, 234, 0.08); padding: 8px 12px; font-size: 13px; }
  .inline { display: inline; }
  button, .button { background: #3e4c59; color: #fff; border: 0; border-radius: 4px; padding: 6px 12px; cursor: pointer; text-decoration: none; font-size: 14px; }
</style>"#;

fn layout(title: &str, flash: &Flash, body: &str) -> String {
    let mut html = String::with_capacity(body.len() + 2048);
    let _ = write!(
        html,
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{} - Riskscan</title>{STYLE}</head><body>\
         <nav><a href=\"/\">Dashboard</a><a href=\"/analyze\">Analyze</a><a href=\"/history\">History</a>\
         <a href=\"/settings\">Settings</a></nav><main>",
        text(title)
    );
    if let Some((level, notice)) = flash.message() {
        let _ = write!(
            html,
            "<div class=\"notice notice-{}\">{}</div>",
            level.as_str(),
            text(notice)
        );
    }
    html.push_str(body);
    html.push_str("</main></body></html>");
    html
}

fn timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn pill(category: &str) -> String {
    format!(
        "<span class=\"pill\" style=\"background:{}\">{}</span>",
        category_color(category),
        text(category)
    )
}

/// One-line note shown above each category's clauses.
pub fn category_intro(category: &str) -> &'static str {
    match category.trim().to_lowercase().as_str() {
        "payment terms" => "Sets when and how much you pay; late fees and deposits usually sit here.",
        "liability & exclusions" => "Decides who pays when something goes wrong and caps what you can recover.",
        "termination" => "Controls how either side can end the contract and what notice or penalty applies.",
        "intellectual property" => "Determines who owns the work produced and what each side may reuse.",
        "confidentiality" => "Limits what information you may share, with whom, and for how long.",
        _ => "Clauses the model grouped under this category.",
    }
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        "<div class=\"card\"><h2>{}</h2><p>{}</p><p><a href=\"/\">Back to dashboard</a></p></div>",
        status.as_u16(),
        text(message)
    );
    layout("Error", &Flash::default(), &body)
}

pub fn dashboard(overview: &Overview, flash: &Flash) -> String {
    let total: i64 = overview.category_counts.iter().map(|(_, n)| n).sum();
    let mut body = String::from("<div class=\"card\"><h2>Recent analyses</h2>");
    if overview.recent.is_empty() {
        body.push_str("<p class=\"muted\">No analyses yet. <a href=\"/analyze\">Upload a contract</a>.</p>");
    } else {
        body.push_str("<table><tr><th>File</th><th>Risk</th><th>Hits</th><th>Finished</th></tr>");
        for a in &overview.recent {
            let _ = write!(
                body,
                "<tr><td><a href=\"/analyze/{id}\">{file}</a></td><td>{risk}</td><td>{hits}</td><td>{at}</td></tr>",
                id = a.id,
                file = text(&a.filename),
                risk = a.risk_score,
                hits = a.total_hits,
                at = timestamp(a.finished_at),
            );
        }
        body.push_str("</table>");
    }
    body.push_str("</div>");
    let _ = write!(body, "<div class=\"card\"><h2>Hits by category</h2><p class=\"muted\">{total} total</p><table>");
    for (category, n) in &overview.category_counts {
        let _ = write!(body, "<tr><td>{}</td><td>{n}</td></tr>", pill(category));
    }
    body.push_str("</table></div>");
    layout("Dashboard", flash, &body)
}

pub fn upload_form(max_mb: u64, flash: &Flash) -> String {
    let body = format!(
        "<div class=\"card\"><h2>Analyze a contract</h2>\
         <form method=\"post\" action=\"/analyze/run\" enctype=\"multipart/form-data\">\
         <p><input type=\"file\" name=\"file\" accept=\".pdf,.docx\"></p>\
         <p class=\"muted\">PDF or DOCX, up to {max_mb} MB.</p>\
         <button type=\"submit\">Analyze</button></form></div>"
    );
    layout("Analyze", flash, &body)
}

const EXPLAIN_SCRIPT: &str = r#"<script>
document.querySelectorAll('button.explain').forEach(function (b) {
  b.addEventListener('click', async function () {
    var out = document.getElementById(b.dataset.target);
    out.textContent = 'Asking...';
    try {
      var r = await fetch(b.dataset.url, { method: 'POST' });
      var j = await r.json();
      out.textContent = j.ok ? j.explanation : j.error;
    } catch (e) {
      out.textContent = String(e);
    }
  });
});
</script>"#;

pub fn result(view: &AnalysisView, flash: &Flash) -> String {
    let id = view.analysis.id;
    let mut body = String::new();
    let _ = write!(
        body,
        "<div class=\"card\"><h2>{file}</h2>\
         <p>Risk score <strong>{risk}</strong> &middot; {hits} hits &middot; <span class=\"muted\">{model} {version} &middot; {at}</span></p>\
         <form class=\"inline\" method=\"post\" action=\"/analyze/{id}/export\"><button type=\"submit\">Export report</button></form> \
         <form class=\"inline\" method=\"post\" action=\"/history/{id}/reanalyze\"><button type=\"submit\">Re-analyze</button></form>",
        file = text(&view.contract.filename),
        risk = view.analysis.risk_score,
        hits = view.hits.len(),
        model = text(view.analysis.model_name.as_deref().unwrap_or("")),
        version = text(view.analysis.model_version.as_deref().unwrap_or("")),
        at = timestamp(view.analysis.finished_at),
    );
    if view.is_pdf {
        let _ = write!(
            body,
            " <a class=\"button\" href=\"/analyze/{id}/pdf/viewer/original\">View PDF</a> \
             <a class=\"button\" href=\"/analyze/{id}/pdf/viewer/highlighted\">Highlighted PDF</a>"
        );
    }
    body.push_str("</div>");

    if !view.summary_text.trim().is_empty() {
        let _ = write!(
            body,
            "<div class=\"card\"><h3>Summary</h3><pre class=\"preview-text\">{}</pre></div>",
            text(&view.summary_text)
        );
    }

    body.push_str("<div class=\"card\"><h3>Detected clauses</h3>");
    if view.hits.is_empty() {
        body.push_str("<p class=\"muted\">No risky clauses detected above the current thresholds.</p>");
    }
    for (category, hits) in &view.hits_by_category {
        let color = view
            .category_colors
            .get(category)
            .map(String::as_str)
            .unwrap_or_else(|| category_color(category));
        let _ = write!(
            body,
            "<details open class=\"category-{class}\"><summary>{pill} ({n})</summary>\
             <div class=\"category-intro\" style=\"border-left: 3px solid {color};\">\
             <strong>Why this category matters:</strong> {intro}</div>",
            class = css_class(category),
            pill = pill(category),
            n = view.counts.get(category).copied().unwrap_or(hits.len()),
            intro = text(category_intro(category)),
        );
        for hit in hits {
            let anchor = view.hit_index.get(&hit.id).copied().unwrap_or_default();
            let _ = write!(
                body,
                "<div class=\"hit\" style=\"border-left-color:{color}\">\
                 <div class=\"muted\"><a href=\"#hit-{anchor}\">#{anchor}</a> &middot; Confidence {prob:.2} &middot; {severity}{ambiguous}",
                prob = hit.prob,
                severity = text(&hit.severity),
                ambiguous = if hit.ambiguous { " &middot; <em>ambiguous</em>" } else { "" },
            );
            if let Some(page) = view.hit_pages.get(&hit.id) {
                let _ = write!(
                    body,
                    " &middot; <a href=\"/analyze/{id}/pdf#page={page}\">page {page}</a>"
                );
            }
            let _ = write!(
                body,
                "</div><div>{excerpt}</div>\
                 <button class=\"explain\" type=\"button\" data-url=\"/analyze/{id}/explain/{hit_id}\" data-target=\"explain-{hit_id}\">Explain</button>\
                 <div class=\"muted\" id=\"explain-{hit_id}\"></div></div>",
                excerpt = text(&hit.text_excerpt),
                hit_id = hit.id,
            );
        }
        body.push_str("</details>");
    }
    body.push_str("</div>");

    let _ = write!(
        body,
        "<div class=\"card\"><h3>Document</h3>{}</div>",
        view.annotated_html
    );
    body.push_str(EXPLAIN_SCRIPT);
    layout(&view.contract.filename, flash, &body)
}

pub fn history(rows: &[HistoryRow], flash: &Flash) -> String {
    let mut body = String::from("<div class=\"card\"><h2>History</h2>");
    if rows.is_empty() {
        body.push_str("<p class=\"muted\">Nothing analyzed yet.</p>");
    } else {
        body.push_str(
            "<table><tr><th>#</th><th>File</th><th>Model</th><th>Risk</th><th>Hits</th>\
             <th>Top category</th><th>Finished</th><th></th></tr>",
        );
        for row in rows {
            let a = &row.listing;
            let _ = write!(
                body,
                "<tr><td>{id}</td><td><a href=\"/history/{id}\">{file}</a></td><td>{model}</td><td>{risk}</td>\
                 <td>{hits}</td><td>{top}</td><td>{at}</td><td>\
                 <form class=\"inline\" method=\"post\" action=\"/history/{id}/reanalyze\"><button type=\"submit\">Re-analyze</button></form> \
                 <form class=\"inline\" method=\"post\" action=\"/history/{id}/delete\"><button type=\"submit\">Delete</button></form>\
                 </td></tr>",
                id = a.id,
                file = text(&a.filename),
                model = text(a.model_name.as_deref().unwrap_or("")),
                risk = a.risk_score,
                hits = a.total_hits,
                top = row.top_category.as_deref().map(pill).unwrap_or_else(|| "-".to_string()),
                at = timestamp(a.finished_at),
            );
        }
        body.push_str("</table>");
    }
    body.push_str("</div>");
    layout("History", flash, &body)
}

pub fn settings(settings: &Settings, flash: &Flash) -> String {
    let body = format!(
        "<div class=\"card\"><h2>Settings</h2>\
         <form method=\"post\" action=\"/settings\" enctype=\"multipart/form-data\"><table>\
         <tr><td>Model</td><td><input name=\"model_name_or_path\" size=\"50\" value=\"{model}\"></td></tr>\
         <tr><td>Threshold</td><td><input name=\"threshold\" value=\"{threshold}\"></td></tr>\
         <tr><td>Category thresholds</td><td><textarea name=\"category_thresholds\" rows=\"4\" cols=\"40\">{overrides}</textarea>\
         <div class=\"muted\">One Category=value per line.</div></td></tr>\
         <tr><td>Merge window (chars)</td><td><input name=\"merge_window_chars\" value=\"{merge}\"></td></tr>\
         <tr><td>Upload limit (MB)</td><td><input name=\"upload_max_mb\" value=\"{max_mb}\"></td></tr>\
         <tr><td>Disclaimer</td><td><textarea name=\"disclaimer\" rows=\"3\" cols=\"60\">{disclaimer}</textarea></td></tr>\
         <tr><td>Gemini summaries</td><td><input type=\"checkbox\" name=\"enable_gemini\"{checked}></td></tr>\
         <tr><td>Gemini model</td><td><input name=\"gemini_model\" value=\"{gemini}\"></td></tr>\
         <tr><td>Report logo</td><td><input type=\"file\" name=\"logo\" accept=\"image/*\"> <span class=\"muted\">{logo}</span></td></tr>\
         </table><button type=\"submit\">Save</button></form></div>",
        model = attr(&settings.model_name_or_path),
        threshold = settings.threshold,
        overrides = text(&settings.format_category_thresholds()),
        merge = settings.merge_window_chars,
        max_mb = settings.upload_max_mb,
        disclaimer = text(&settings.disclaimer),
        checked = if settings.enable_gemini { " checked" } else { "" },
        gemini = attr(&settings.gemini_model),
        logo = text(&settings.logo_path),
    );
    layout("Settings", flash, &body)
}

const VIEWER_SCRIPT: &str = r#"<script>
(async function () {
  var list = document.getElementById('hit-list');
  var frame = document.getElementById('pdf-frame');
  var r = await fetch(list.dataset.coords);
  var j = await r.json();
  if (!j.ok) { list.textContent = j.error; return; }
  var rectsByHit = {};
  j.rects.forEach(function (rc) { (rectsByHit[rc.hit_id] = rectsByHit[rc.hit_id] || []).push(rc); });
  j.hits.forEach(function (h, i) {
    var page = (rectsByHit[h.id] && rectsByHit[h.id][0].page) || j.pages_by_hit[String(h.id)] || 1;
    var li = document.createElement('li');
    var a = document.createElement('a');
    a.href = list.dataset.file + '#page=' + page;
    a.textContent = '#' + (i + 1) + ' ' + h.category + ' (page ' + page + ')';
    a.addEventListener('click', function (ev) { ev.preventDefault(); frame.src = a.href; });
    li.appendChild(a);
    if (list.dataset.overlay === 'true' && rectsByHit[h.id]) {
      li.title = rectsByHit[h.id].length + ' matched line(s)';
    }
    list.appendChild(li);
  });
})();
</script>"#;

pub fn pdf_viewer(analysis_id: i64, file_url: &str, coords_url: &str, overlay: bool, flash: &Flash) -> String {
    let body = format!(
        "<div class=\"card\"><p><a href=\"/analyze/{analysis_id}\">Back to result</a></p>\
         <div style=\"display:flex;gap:16px\">\
         <iframe id=\"pdf-frame\" src=\"{file}\" style=\"flex:3;height:80vh;border:1px solid #e4e7eb\"></iframe>\
         <ol id=\"hit-list\" style=\"flex:1\" data-file=\"{file}\" data-coords=\"{coords}\" data-overlay=\"{overlay}\"></ol>\
         </div></div>{VIEWER_SCRIPT}",
        file = attr(file_url),
        coords = attr(coords_url),
    );
    layout("PDF viewer", flash, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_escapes_notice_and_title() {
        let flash = Flash {
            notice: Some("<b>done</b>".into()),
            level: Some("success".into()),
        };
        let html = layout("a<b", &flash, "<p>x</p>");
        assert!(html.contains("<title>a&lt;b - Riskscan</title>"));
        assert!(html.contains("<div class=\"notice notice-success\">&lt;b&gt;done&lt;/b&gt;</div>"));
        assert!(html.contains("<p>x</p>"));
    }

    #[test]
    fn intros_cover_known_categories() {
        assert!(category_intro("Termination").contains("end the contract"));
        assert_eq!(category_intro("Force Majeure"), "Clauses the model grouped under this category.");
    }

    #[test]
    fn settings_form_round_trips_values() {
        let mut s = Settings::default();
        s.gemini_model = "m\"x".into();
        let html = settings(&s, &Flash::default());
        assert!(html.contains("value=\"m&quot;x\""));
        assert!(html.contains("name=\"threshold\" value=\"0.6\""));
    }
}
